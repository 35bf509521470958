/// Limits applied to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Nested method invocations allowed before failing with
    /// [`RuntimeError::StackTooDeep`](crate::RuntimeError::StackTooDeep).
    pub max_call_depth: usize,
    /// Superclass hops a lookup may take before giving up.
    pub max_class_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_class_depth: 64,
        }
    }
}

impl VmConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_call_depth == 0 {
            return Err("max_call_depth must be > 0");
        }
        if self.max_class_depth == 0 {
            return Err("max_class_depth must be > 0");
        }
        Ok(())
    }
}
