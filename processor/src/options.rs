// RUNTIME OPTIONS
// ================================================================================================

/// Scheduling and compilation knobs of the runtime.
///
/// The step interval is the host's frame cadence; the sequencer spends at most
/// `work_time_fraction` of it per [`step_threads`](crate::Runtime::step_threads) call. Warp-mode
/// frames may run up to `warp_time_ms` between yields. The compile token bucket accrues
/// `compile_tokens_per_ms` per wall millisecond up to `compile_token_cap`; these constants are
/// empirically tuned defaults, kept configurable.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    step_interval_ms: f64,
    work_time_fraction: f64,
    warp_time_ms: f64,
    compile_token_cap: f64,
    compile_tokens_per_ms: f64,
    compiler_enabled: bool,
    turbo_mode: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            step_interval_ms: 1000.0 / 30.0,
            work_time_fraction: 0.75,
            warp_time_ms: 500.0,
            compile_token_cap: 10.0,
            compile_tokens_per_ms: 1.0,
            compiler_enabled: true,
            turbo_mode: false,
        }
    }
}

impl RuntimeOptions {
    // BUILDERS
    // --------------------------------------------------------------------------------------------

    pub fn with_step_interval_ms(mut self, ms: f64) -> Result<Self, OptionsError> {
        if !(ms > 0.0) {
            return Err(OptionsError::InvalidStepInterval(ms));
        }
        self.step_interval_ms = ms;
        Ok(self)
    }

    pub fn with_work_time_fraction(mut self, fraction: f64) -> Result<Self, OptionsError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(OptionsError::InvalidWorkTimeFraction(fraction));
        }
        self.work_time_fraction = fraction;
        Ok(self)
    }

    pub fn with_warp_time_ms(mut self, ms: f64) -> Result<Self, OptionsError> {
        if !(ms >= 0.0) {
            return Err(OptionsError::InvalidWarpTime(ms));
        }
        self.warp_time_ms = ms;
        Ok(self)
    }

    pub fn with_compile_tokens(mut self, cap: f64, per_ms: f64) -> Result<Self, OptionsError> {
        if !(cap > 0.0 && per_ms > 0.0) {
            return Err(OptionsError::InvalidCompileTokens { cap, per_ms });
        }
        self.compile_token_cap = cap;
        self.compile_tokens_per_ms = per_ms;
        Ok(self)
    }

    pub fn with_compiler_enabled(mut self, enabled: bool) -> Self {
        self.compiler_enabled = enabled;
        self
    }

    pub fn with_turbo_mode(mut self, turbo: bool) -> Self {
        self.turbo_mode = turbo;
        self
    }

    // ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn step_interval_ms(&self) -> f64 {
        self.step_interval_ms
    }

    pub fn work_time_ms(&self) -> f64 {
        self.step_interval_ms * self.work_time_fraction
    }

    pub fn warp_time_ms(&self) -> f64 {
        self.warp_time_ms
    }

    pub fn compile_token_cap(&self) -> f64 {
        self.compile_token_cap
    }

    pub fn compile_tokens_per_ms(&self) -> f64 {
        self.compile_tokens_per_ms
    }

    pub fn compiler_enabled(&self) -> bool {
        self.compiler_enabled
    }

    pub fn turbo_mode(&self) -> bool {
        self.turbo_mode
    }
}

// OPTIONS ERROR
// ================================================================================================

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("step interval must be positive, got {0}")]
    InvalidStepInterval(f64),
    #[error("work time fraction must be in (0, 1], got {0}")]
    InvalidWorkTimeFraction(f64),
    #[error("warp time must be non-negative, got {0}")]
    InvalidWarpTime(f64),
    #[error("compile token constants must be positive, got cap {cap} at {per_ms}/ms")]
    InvalidCompileTokens { cap: f64, per_ms: f64 },
}
