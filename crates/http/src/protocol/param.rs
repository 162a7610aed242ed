//! The closed-set tuning parameter surface.
//!
//! Parameters resolve through an upward chain: session values first, then
//! the owning role (server or client), then the built-in defaults. Each
//! link is a [`Parameters`] holding its own overrides plus an optional
//! parent. A request-side decoder therefore reads server-scoped values and
//! a response-side decoder reads client-scoped values without either
//! holding a back-pointer to its role.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::error::ParameterError;

/// The recognized parameter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Size of the read buffer used for each socket read.
    MaxBufferSize,
    /// In-memory body/chunk byte budget before spillover to a temp file.
    MemChunkSizeLimit,
}

impl Parameter {
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::MaxBufferSize => "MAXBUFFERSIZE",
            Parameter::MemChunkSizeLimit => "MEMCHUNKSIZELIMIT",
        }
    }

    fn builtin_default(&self) -> u64 {
        match self {
            Parameter::MaxBufferSize => 4096,
            Parameter::MemChunkSizeLimit => 1_048_576,
        }
    }
}

/// One link in the parameter chain.
///
/// Writable until shared; lookups are read-only thereafter.
#[derive(Debug, Default)]
pub struct Parameters {
    values: RwLock<HashMap<Parameter, u64>>,
    parent: Option<Arc<Parameters>>,
}

impl Parameters {
    /// A root link falling back to the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A child link deferring to `parent` for unset keys.
    pub fn with_parent(parent: Arc<Parameters>) -> Self {
        Self { values: RwLock::new(HashMap::new()), parent: Some(parent) }
    }

    pub fn set(&self, parameter: Parameter, value: u64) -> &Self {
        self.values.write().unwrap().insert(parameter, value);
        self
    }

    /// Resolve a key through the chain, ending at the built-in default.
    pub fn get(&self, parameter: Parameter) -> u64 {
        if let Some(value) = self.values.read().unwrap().get(&parameter) {
            return *value;
        }
        match &self.parent {
            Some(parent) => parent.get(parameter),
            None => parameter.builtin_default(),
        }
    }

    /// As [`Parameters::get`], but reports an absent key instead of
    /// defaulting. The built-in defaults cover the whole closed set, so
    /// this only errs for a chain explicitly configured without them.
    pub fn checked_get(&self, parameter: Parameter) -> Result<u64, ParameterError> {
        if let Some(value) = self.values.read().unwrap().get(&parameter) {
            return Ok(*value);
        }
        match &self.parent {
            Some(parent) => parent.checked_get(parameter),
            None => Err(ParameterError::ParameterNotFound { name: parameter.name() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_defaults() {
        let params = Parameters::new();
        assert_eq!(params.get(Parameter::MaxBufferSize), 4096);
        assert_eq!(params.get(Parameter::MemChunkSizeLimit), 1_048_576);
    }

    #[test]
    fn chain_resolution() {
        let role = Arc::new(Parameters::new());
        role.set(Parameter::MemChunkSizeLimit, 10);

        let session = Parameters::with_parent(role.clone());
        // Unset on the session: inherited from the role.
        assert_eq!(session.get(Parameter::MemChunkSizeLimit), 10);
        // Unset everywhere: built-in default.
        assert_eq!(session.get(Parameter::MaxBufferSize), 4096);

        // Session override wins over the role.
        session.set(Parameter::MemChunkSizeLimit, 7);
        assert_eq!(session.get(Parameter::MemChunkSizeLimit), 7);
        assert_eq!(role.get(Parameter::MemChunkSizeLimit), 10);
    }

    #[test]
    fn checked_lookup_reports_absent_keys() {
        let params = Parameters::new();
        assert_eq!(
            params.checked_get(Parameter::MaxBufferSize),
            Err(ParameterError::ParameterNotFound { name: "MAXBUFFERSIZE" })
        );

        params.set(Parameter::MaxBufferSize, 1024);
        assert_eq!(params.checked_get(Parameter::MaxBufferSize), Ok(1024));
    }
}
