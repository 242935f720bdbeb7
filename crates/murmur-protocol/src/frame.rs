//! Conversion of message parts into wire frames.
//!
//! `whisper` and `shout` accept any iterator of [`IntoFrame`] values. Parts
//! are converted in order; if one fails, the frames built so far are
//! dropped and nothing is sent.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::MurmurError;

/// A message part that could not be turned into a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FrameError(pub String);

/// A value that can become one frame of a multi-part message.
pub trait IntoFrame {
    fn into_frame(self) -> Result<Bytes, FrameError>;
}

impl IntoFrame for Bytes {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        Ok(self)
    }
}

impl IntoFrame for Vec<u8> {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        Ok(Bytes::from(self))
    }
}

impl IntoFrame for &[u8] {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl<const N: usize> IntoFrame for &[u8; N] {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl IntoFrame for String {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        Ok(Bytes::from(self))
    }
}

impl IntoFrame for &String {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }
}

impl IntoFrame for &str {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }
}

impl IntoFrame for Cow<'_, str> {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        Ok(Bytes::from(self.into_owned()))
    }
}

impl IntoFrame for &OsStr {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        self.to_str()
            .map(|s| Bytes::copy_from_slice(s.as_bytes()))
            .ok_or_else(|| FrameError(format!("{self:?} is not valid UTF-8")))
    }
}

impl IntoFrame for OsString {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        self.into_string()
            .map(Bytes::from)
            .map_err(|raw| FrameError(format!("{raw:?} is not valid UTF-8")))
    }
}

impl IntoFrame for &Path {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        self.as_os_str().into_frame()
    }
}

impl IntoFrame for PathBuf {
    fn into_frame(self) -> Result<Bytes, FrameError> {
        self.into_os_string().into_frame()
    }
}

macro_rules! display_frame {
    ($($ty:ty),*) => {
        $(
            impl IntoFrame for $ty {
                fn into_frame(self) -> Result<Bytes, FrameError> {
                    Ok(Bytes::from(self.to_string()))
                }
            }
        )*
    };
}

display_frame!(char, bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

/// Convert every part, stopping at the first failure.
pub(crate) fn collect_frames<I, F>(parts: I) -> Result<Vec<Bytes>, MurmurError>
where
    I: IntoIterator<Item = F>,
    F: IntoFrame,
{
    parts
        .into_iter()
        .enumerate()
        .map(|(index, part)| {
            part.into_frame()
                .map_err(|source| MurmurError::InvalidFrame { index, source })
        })
        .collect()
}
