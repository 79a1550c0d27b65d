//! Fixed, ordered action space of command templates

use crate::core::error::{ReconError, Result};
use crate::core::types::ActionIndex;

/// Slot replaced by the target IP when an action is rendered
pub const IP_SLOT: &str = "{ip}";

#[derive(Debug, Clone)]
pub struct ActionSpace {
    templates: Vec<String>,
}

impl ActionSpace {
    pub fn new(templates: Vec<String>) -> Result<Self> {
        if templates.is_empty() {
            return Err(ReconError::Config("action space must not be empty".into()));
        }
        Ok(Self { templates })
    }

    pub fn get(&self, index: ActionIndex) -> Result<&str> {
        self.templates
            .get(index)
            .map(String::as_str)
            .ok_or(ReconError::UnknownAction(index))
    }

    /// Command line for an action against a target
    pub fn render(&self, index: ActionIndex, ip: &str) -> Result<String> {
        Ok(self.get(index)?.replace(IP_SLOT, ip))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::default_actions;

    #[test]
    fn test_render_substitutes_ip() {
        let space = ActionSpace::new(default_actions()).unwrap();
        assert_eq!(space.render(0, "192.168.56.101").unwrap(), "nmap -F 192.168.56.101");
        assert_eq!(
            space.render(5, "10.0.0.1").unwrap(),
            "curl -sI http://10.0.0.1"
        );
    }

    #[test]
    fn test_unknown_index_is_key_error() {
        let space = ActionSpace::new(vec!["nmap -F {ip}".into()]).unwrap();
        assert!(matches!(space.get(3), Err(ReconError::UnknownAction(3))));
    }

    #[test]
    fn test_empty_space_rejected() {
        assert!(ActionSpace::new(Vec::new()).is_err());
    }
}
