//! Translation of WASAPI and COM failure codes.

use audio_bridge_core::ErrorCode;

pub const E_ACCESSDENIED: i32 = 0x8007_0005_u32 as i32;
pub const E_OUTOFMEMORY: i32 = 0x8007_000E_u32 as i32;
pub const E_NOTFOUND: i32 = 0x8007_0490_u32 as i32;
pub const AUDCLNT_E_DEVICE_INVALIDATED: i32 = 0x8889_0004_u32 as i32;
pub const AUDCLNT_E_UNSUPPORTED_FORMAT: i32 = 0x8889_0008_u32 as i32;
pub const AUDCLNT_E_DEVICE_IN_USE: i32 = 0x8889_000A_u32 as i32;

/// Map an `HRESULT` onto an [`ErrorCode`], using `fallback` for codes with no
/// closer match.
pub fn to_error_code(hr: i32, fallback: ErrorCode) -> ErrorCode {
    match hr {
        E_ACCESSDENIED => ErrorCode::AccessDenied,
        E_OUTOFMEMORY => ErrorCode::OutOfMemory,
        E_NOTFOUND | AUDCLNT_E_DEVICE_INVALIDATED => ErrorCode::NoDevice,
        AUDCLNT_E_UNSUPPORTED_FORMAT => ErrorCode::FormatNotSupported,
        AUDCLNT_E_DEVICE_IN_USE => ErrorCode::DeviceBusy,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_specific_errors() {
        assert_eq!(E_ACCESSDENIED, -2147024891);
        assert_eq!(AUDCLNT_E_DEVICE_IN_USE, -2004287478);
        assert_eq!(to_error_code(E_ACCESSDENIED, ErrorCode::Generic), ErrorCode::AccessDenied);
        assert_eq!(
            to_error_code(AUDCLNT_E_DEVICE_IN_USE, ErrorCode::Generic),
            ErrorCode::DeviceBusy
        );
        assert_eq!(
            to_error_code(AUDCLNT_E_UNSUPPORTED_FORMAT, ErrorCode::Generic),
            ErrorCode::FormatNotSupported
        );
        assert_eq!(to_error_code(E_NOTFOUND, ErrorCode::Generic), ErrorCode::NoDevice);
    }

    #[test]
    fn unknown_codes_use_fallback() {
        assert_eq!(
            to_error_code(0x8000_4005_u32 as i32, ErrorCode::FailedToOpenBackendDevice),
            ErrorCode::FailedToOpenBackendDevice
        );
    }
}
