//! Remote archives that can turn a [`RetrievalRequest`] into a GRIB file on disk.

pub mod ads;
pub mod credentials;

use std::path::{Path, PathBuf};

pub use ads::AdsArchive;
pub use credentials::Credentials;

use crate::{error::Result, request::RetrievalRequest};

pub trait Archive {
    /// Fetch `request` and write the resulting file to `target`, replacing any
    /// file already there. Returns the number of bytes written.
    ///
    /// Every call is a genuine network transfer; memoization is the job of
    /// [`crate::cache::ForecastCache`].
    async fn retrieve(&self, request: &RetrievalRequest, target: &Path) -> Result<u64>;
}

impl<A: Archive + ?Sized> Archive for &A {
    async fn retrieve(&self, request: &RetrievalRequest, target: &Path) -> Result<u64> {
        (**self).retrieve(request, target).await
    }
}

/// The sibling file a download is streamed into before it replaces `target`.
pub(crate) fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
