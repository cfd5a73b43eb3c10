use crate::error;

pub type Result<T> = ::std::result::Result<T, error::Error>;

/// Build an `Error::Nfs` from a status variant name and an optional message
#[macro_export]
macro_rules! nfs_err {
    ($stat:ident) => {
        $crate::error::Error::Nfs($crate::proto::NfsStat4::$stat, String::new())
    };
    ($stat:ident, $($arg:tt)+) => {
        $crate::error::Error::Nfs($crate::proto::NfsStat4::$stat, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! io_err {
    ($kind:ident, $msg:expr) => {
        ::std::io::Error::new(::std::io::ErrorKind::$kind, $msg)
    };
}

#[macro_export]
macro_rules! res {
    ($err:expr) => {
        Err(From::from($err))
    };
}

/// Milliseconds since the unix epoch, used as a change counter
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
