/// Progress reporting for long-running engine operations
use std::fmt;

/// A human-readable status update
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub operation: String,
    pub percent: Option<f32>,
}

impl ProgressEvent {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            percent: None,
        }
    }

    pub fn with_percent(operation: impl Into<String>, percent: f32) -> Self {
        Self {
            operation: operation.into(),
            percent: Some(percent),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent {
            Some(percent) => write!(f, "{} ({:4.2}%)", self.operation, percent),
            None => write!(f, "{}", self.operation),
        }
    }
}

/// Optional progress sink. The callback runs synchronously on the calling
/// thread after each unit of work, so it must return promptly.
#[derive(Default)]
pub struct Progress<'a> {
    callback: Option<Box<dyn FnMut(&ProgressEvent) + 'a>>,
}

impl<'a> Progress<'a> {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&ProgressEvent) + 'a,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// A sink that drops every event
    pub fn none() -> Self {
        Self { callback: None }
    }

    pub fn emit(&mut self, event: ProgressEvent) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&event);
        }
    }

    pub fn message(&mut self, operation: impl Into<String>) {
        if self.callback.is_some() {
            self.emit(ProgressEvent::new(operation));
        }
    }
}

impl fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_collects_events() {
        let mut seen = Vec::new();
        {
            let mut progress = Progress::new(|event| seen.push(event.to_string()));
            progress.emit(ProgressEvent::with_percent("Saving video.h264", 50.0));
            progress.message("Done");
        }
        assert_eq!(seen, vec!["Saving video.h264 (50.00%)", "Done"]);
    }

    #[test]
    fn test_none_is_silent() {
        let mut progress = Progress::none();
        progress.message("ignored");
        assert_eq!(format!("{:?}", progress), "Progress { callback: false }");
    }
}
