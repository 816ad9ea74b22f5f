pub mod api;
pub mod core;

pub use crate::core::flow::{
    ExtractionReport, Flow, FlowConfig, FlowError, RunStatus, SamplingDriver,
};

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("flowshot_rust"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // RUST_LOG controls the level; a second call is a no-op
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .try_init();
    }
}
