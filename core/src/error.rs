use std::fmt;

/// Where an error was produced.
///
/// Framework errors carry one of the [Code] values below. Business errors
/// are decoded out of the response by the protocol codec and keep whatever
/// code the server assigned.
#[derive(strum::Display, strum::AsRefStr, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    #[strum(serialize = "framework")]
    Framework,
    #[strum(serialize = "business")]
    Business,
}

/// Framework error codes for the client call path.
///
/// The numeric values are part of the wire contract, do not renumber.
#[derive(strum::Display, strum::AsRefStr, strum::FromRepr, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Code {
    #[strum(serialize = "ok")]
    Ok = 0,
    /// Request timed out on the per-call deadline
    #[strum(serialize = "client_timeout")]
    ClientTimeout = 101,
    /// Request timed out on a deadline inherited from upstream
    #[strum(serialize = "client_full_link_timeout")]
    ClientFullLinkTimeout = 102,
    /// Connection establishment failed
    #[strum(serialize = "client_connect_fail")]
    ClientConnectFail = 111,
    /// Marshal / compress / frame-encode failed
    #[strum(serialize = "client_encode_fail")]
    ClientEncodeFail = 121,
    /// Frame-decode / decompress / unmarshal failed
    #[strum(serialize = "client_decode_fail")]
    ClientDecodeFail = 122,
    /// Target parsing or node selection failed
    #[strum(serialize = "client_route_err")]
    ClientRouteErr = 131,
    /// Network error during transmission
    #[strum(serialize = "client_net_err")]
    ClientNetErr = 141,
    /// Context canceled by the caller
    #[strum(serialize = "client_canceled")]
    ClientCanceled = 161,
}

// strum's Display already renders the snake_case name, mirror it in Debug.
impl fmt::Debug for Code {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error surfaced by the client `invoke`: a type tag, a numeric code and a
/// human readable message.
#[derive(Clone, PartialEq, thiserror::Error)]
#[error("type:{etype}, code:{code}, msg:{msg}")]
pub struct Error {
    pub etype: ErrorType,
    pub code: i32,
    pub msg: String,
}

impl Error {
    #[inline]
    pub fn frame(code: Code, msg: impl Into<String>) -> Self {
        Self { etype: ErrorType::Framework, code: code as i32, msg: msg.into() }
    }

    #[inline]
    pub fn business(code: i32, msg: impl Into<String>) -> Self {
        Self { etype: ErrorType::Business, code, msg: msg.into() }
    }

    /// Sentinel returned by send-only transports: the request was flushed
    /// and no response will ever arrive.
    #[inline]
    pub fn client_no_response() -> Self {
        Self::frame(Code::Ok, "client: no response")
    }

    #[inline]
    pub fn is_framework(&self) -> bool {
        self.etype == ErrorType::Framework
    }

    #[inline]
    pub fn is_no_response(&self) -> bool {
        self.is_framework() && self.code == Code::Ok as i32
    }

    /// The framework [Code], when this is a framework error with a known code.
    #[inline]
    pub fn frame_code(&self) -> Option<Code> {
        if self.is_framework() { Code::from_repr(self.code) } else { None }
    }
}

impl fmt::Debug for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::cmp::PartialEq<Code> for Error {
    #[inline]
    fn eq(&self, other: &Code) -> bool {
        self.is_framework() && self.code == *other as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_repr() {
        assert_eq!(Code::ClientTimeout as i32, 101);
        assert_eq!(Code::from_repr(102), Some(Code::ClientFullLinkTimeout));
        assert_eq!(Code::from_repr(103), None);
        assert_eq!(Code::ClientRouteErr.to_string(), "client_route_err");
    }

    #[test]
    fn test_error_display() {
        let e = Error::frame(Code::ClientEncodeFail, "client: codec empty");
        assert_eq!(format!("{}", e), "type:framework, code:121, msg:client: codec empty");
        assert_eq!(e, Code::ClientEncodeFail);
        assert!(e.is_framework());

        let b = Error::business(10001, "no such user");
        assert!(!b.is_framework());
        assert_eq!(b.frame_code(), None);
        assert!(b != Code::ClientEncodeFail);
    }

    #[test]
    fn test_no_response_sentinel() {
        let e = Error::client_no_response();
        assert!(e.is_no_response());
        assert!(!Error::frame(Code::ClientNetErr, "reset").is_no_response());
        assert!(!Error::business(0, "zero").is_no_response());
    }
}
