use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionReport {
    pub microphone: PermissionState,
    pub guidance: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorClass {
    PermissionDenied,
    DeviceNotFound,
    Unsupported,
    Other,
}

pub fn check_permissions() -> PermissionReport {
    let microphone = check_microphone_permission();

    let mut guidance = Vec::new();
    match microphone {
        PermissionState::Denied => guidance
            .push("Microphone is unavailable. Connect or enable a recording device.".to_string()),
        PermissionState::Unknown => guidance.push(
            "Could not enumerate audio input devices; dictation may be unsupported here."
                .to_string(),
        ),
        PermissionState::Granted => guidance.push("Permissions look healthy.".to_string()),
    }

    PermissionReport {
        microphone,
        guidance,
    }
}

pub fn check_microphone_permission() -> PermissionState {
    use cpal::traits::HostTrait;

    let host = cpal::default_host();
    match host.input_devices() {
        Ok(_) => {
            if host.default_input_device().is_some() {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            }
        }
        Err(_) => PermissionState::Unknown,
    }
}

pub fn classify_device_error(message: &str) -> DeviceErrorClass {
    let normalized = message.to_lowercase();
    if ["permission", "denied", "not permitted", "not allowed", "access"]
        .iter()
        .any(|needle| normalized.contains(needle))
    {
        return DeviceErrorClass::PermissionDenied;
    }
    if [
        "not found",
        "no such device",
        "no device",
        "not available",
        "no longer available",
        "unavailable",
        "disconnected",
    ]
    .iter()
    .any(|needle| normalized.contains(needle))
    {
        return DeviceErrorClass::DeviceNotFound;
    }
    if ["not supported", "unsupported", "not implemented"]
        .iter()
        .any(|needle| normalized.contains(needle))
    {
        return DeviceErrorClass::Unsupported;
    }
    DeviceErrorClass::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_permission_messages() {
        assert_eq!(
            classify_device_error("Operation not permitted (os error 1)"),
            DeviceErrorClass::PermissionDenied
        );
        assert_eq!(
            classify_device_error("Access denied by the system"),
            DeviceErrorClass::PermissionDenied
        );
    }

    #[test]
    fn classifies_missing_device_messages() {
        assert_eq!(
            classify_device_error("The requested device is no longer available"),
            DeviceErrorClass::DeviceNotFound
        );
        assert_eq!(
            classify_device_error("ALSA: No such device"),
            DeviceErrorClass::DeviceNotFound
        );
    }

    #[test]
    fn classifies_unsupported_and_other() {
        assert_eq!(
            classify_device_error("stream config not supported"),
            DeviceErrorClass::Unsupported
        );
        assert_eq!(
            classify_device_error("backend glitch"),
            DeviceErrorClass::Other
        );
    }
}
