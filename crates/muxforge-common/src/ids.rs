//! Track identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a track within one demuxer or muxer.
///
/// Ids are 1-based and assigned in creation order; they never change once a
/// track exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    /// Wrap a raw 1-based id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw numeric id.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id that follows this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TrackId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_sequence() {
        let first = TrackId::new(1);
        assert_eq!(first.next(), TrackId::new(2));
        assert_eq!(first.next().get(), 2);
        assert_eq!(first.to_string(), "1");
    }
}
