//! Sync progress as an immutable value.
//!
//! The pull syncer publishes one of these after every counter change. Network
//! paging and database saving are weighted as equal halves of total progress,
//! so a sync that has fetched everything but saved nothing reports 0.5.

/// Progress reported while a value is started but its total is still unknown.
pub const STARTED_PROGRESS: f64 = 0.001;

/// Cap below 1.0; only [`DataProgress::is_ended`] reports exactly 1.
pub const MAX_RUNNING_PROGRESS: f64 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DataProgress {
    pub is_started: bool,
    pub is_ended: bool,
    pub is_indeterminate: bool,
    /// Total records this pass intends to pull; `<= 0` means unknown.
    pub data_count: i64,
    /// Records fetched from the network so far.
    pub query_count: i64,
    /// Records committed to the store so far.
    pub saved_count: i64,
}

impl DataProgress {
    #[must_use]
    pub fn started() -> Self {
        Self {
            is_started: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_data_count(mut self, data_count: i64) -> Self {
        self.data_count = data_count;
        self
    }

    #[must_use]
    pub const fn with_query_count(mut self, query_count: i64) -> Self {
        self.query_count = query_count;
        self
    }

    #[must_use]
    pub const fn with_saved_count(mut self, saved_count: i64) -> Self {
        self.saved_count = saved_count;
        self
    }

    #[must_use]
    pub const fn indeterminate(mut self, is_indeterminate: bool) -> Self {
        self.is_indeterminate = is_indeterminate;
        self
    }

    #[must_use]
    pub const fn ended(mut self) -> Self {
        self.is_ended = true;
        self
    }

    /// Fraction complete in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if !self.is_started {
            return 0.0;
        }
        if self.is_ended {
            return 1.0;
        }
        if self.is_indeterminate {
            return 0.5;
        }
        if self.data_count <= 0 {
            return STARTED_PROGRESS;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction =
            (self.query_count + self.saved_count) as f64 / (2.0 * self.data_count as f64);
        fraction.clamp(0.0, MAX_RUNNING_PROGRESS)
    }
}
