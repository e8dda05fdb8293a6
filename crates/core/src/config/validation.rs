use crate::{AgentBusError, AgentBusResult};

pub trait ConfigValidator {
    fn validate(&self) -> AgentBusResult<()>;
}

pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_positive(value: u64, field: &str) -> AgentBusResult<()> {
        if value == 0 {
            return Err(AgentBusError::configuration(format!(
                "{field} must be greater than 0"
            )));
        }
        Ok(())
    }

    pub fn validate_one_of(value: &str, allowed: &[&str], field: &str) -> AgentBusResult<()> {
        if !allowed.contains(&value) {
            return Err(AgentBusError::configuration(format!(
                "{field} must be one of {allowed:?}, got {value:?}"
            )));
        }
        Ok(())
    }
}
