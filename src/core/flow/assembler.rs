use log::debug;
use serde::Serialize;

/// 截图：时间戳 + 编码后的图片
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capture {
    pub timestamp: f64,
    /// `M:SS`
    pub formatted_time: String,
    #[serde(skip)]
    pub image: Vec<u8>,
}

impl Capture {
    pub fn new(timestamp: f64, image: Vec<u8>) -> Self {
        Self {
            timestamp,
            formatted_time: format_time(timestamp),
            image,
        }
    }
}

/// One navigation state: the captures taken between two hard cuts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flow {
    pub id: u32,
    pub captures: Vec<Capture>,
}

impl Flow {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            captures: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.captures.first().map(|c| c.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.captures.last().map(|c| c.timestamp)
    }
}

/// `floor(s/60):floor(s%60)`, seconds zero-padded to two digits.
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{}:{:02}", minutes, secs)
}

/// Groups captures into flows. Exactly one flow is current at a time;
/// empty flows never reach the output.
pub struct FlowAssembler {
    current: Flow,
    finished: Vec<Flow>,
}

impl FlowAssembler {
    pub fn new() -> Self {
        Self {
            current: Flow::new(1),
            finished: Vec::new(),
        }
    }

    /// Close the current flow and open the next one.
    pub fn start_new_flow(&mut self) {
        let next = Flow::new(self.current.id + 1);
        let previous = std::mem::replace(&mut self.current, next);
        if previous.is_empty() {
            debug!("flow {} closed empty, dropped", previous.id);
        } else {
            debug!(
                "🧭 flow {} closed with {} captures",
                previous.id,
                previous.len()
            );
            self.finished.push(previous);
        }
    }

    /// Append to the current flow. Returns `false` (and keeps nothing) when
    /// the capture would break timestamp order.
    pub fn push(&mut self, capture: Capture) -> bool {
        let last = self
            .current
            .last_timestamp()
            .or_else(|| self.finished.last().and_then(Flow::last_timestamp));
        if let Some(last) = last {
            if capture.timestamp <= last {
                return false;
            }
        }
        self.current.captures.push(capture);
        true
    }

    pub fn current_flow_id(&self) -> u32 {
        self.current.id
    }

    pub fn capture_count(&self) -> usize {
        self.finished.iter().map(Flow::len).sum::<usize>() + self.current.len()
    }

    /// Flushes the current flow and renumbers the emitted flows 1..=n.
    pub fn finish(mut self) -> Vec<Flow> {
        if !self.current.is_empty() {
            self.finished.push(self.current);
        }
        for (index, flow) in self.finished.iter_mut().enumerate() {
            flow.id = index as u32 + 1;
        }
        self.finished
    }
}

impl Default for FlowAssembler {
    fn default() -> Self {
        Self::new()
    }
}
