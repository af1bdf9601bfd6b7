//! Well-known channels exempt from the call timeout.
//!
//! These operations legitimately outlive the fixed call window: VM lifecycle
//! operations can take minutes, and the file pickers resolve only once the
//! user closes a dialog.

use busard_core::{TimeoutPolicy, channel_for};

/// Channel namespace of the disk-image extension API.
pub const SERVICE: &str = "DiskImageApi";

/// Channels that must never time out.
pub fn no_timeout_channels() -> Vec<String> {
    [
        "launchVM",
        "createVM",
        "pullImage",
        "selectOutputFolder",
        "selectBuildConfigFile",
        "selectAnacondaKickstartFile",
        "selectSSHPrivateKeyFile",
        "selectVMImageFile",
    ]
    .into_iter()
    .map(|method| channel_for(SERVICE, method))
    .collect()
}

/// Timeout policy for the disk-image application surface: the default window
/// everywhere except the channels above.
pub fn default_policy() -> TimeoutPolicy {
    TimeoutPolicy::new(no_timeout_channels())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_and_picker_channels_are_exempt() {
        let policy = default_policy();
        assert!(policy.is_exempt(&channel_for(SERVICE, "launchVM")));
        assert!(policy.is_exempt(&channel_for(SERVICE, "selectOutputFolder")));
        assert!(!policy.is_exempt(&channel_for(SERVICE, "listImages")));
    }
}
