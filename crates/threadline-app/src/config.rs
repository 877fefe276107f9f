//! Controller and runtime configuration.

use crate::ChatError;

/// Page sizes and session options for a [`crate::Controller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Channels loaded on connect.
    pub channel_page_size: usize,
    /// Include channels without messages in the channel list.
    pub include_empty_channels: bool,
    /// Top-level messages loaded on join (most recent page).
    pub message_page_size: usize,
    /// Thread replies loaded at or before the parent's timestamp.
    pub thread_prev_size: usize,
    /// Thread replies loaded after the parent's timestamp.
    pub thread_next_size: usize,
    /// Users offered by the member selector.
    pub user_page_size: usize,
    /// Accept channel invitations automatically.
    pub auto_accept_invitations: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            channel_page_size: 30,
            include_empty_channels: true,
            message_page_size: 20,
            thread_prev_size: 10,
            thread_next_size: 10,
            user_page_size: 100,
            auto_accept_invitations: true,
        }
    }
}

impl ControllerConfig {
    /// Check that every page size is usable.
    pub fn validate(&self) -> Result<(), ChatError> {
        let sizes = [
            ("channel_page_size", self.channel_page_size),
            ("message_page_size", self.message_page_size),
            ("user_page_size", self.user_page_size),
        ];
        for (name, size) in sizes {
            if size == 0 {
                return Err(ChatError::invalid_argument(format!("{name} must be positive")));
            }
        }
        if self.thread_prev_size == 0 && self.thread_next_size == 0 {
            return Err(ChatError::invalid_argument("thread window must not be empty"));
        }
        Ok(())
    }
}

/// Options for the actor [`crate::Runtime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bounded command mailbox capacity.
    pub mailbox_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { mailbox_capacity: 64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ControllerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let config = ControllerConfig { message_page_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ChatError::InvalidArgument { .. })));
    }

    #[test]
    fn one_sided_thread_window_is_allowed() {
        let config = ControllerConfig { thread_prev_size: 0, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
