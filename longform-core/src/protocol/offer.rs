//! Fitting the file name into a single offer write.

use bytes::Bytes;
use tracing::warn;

use crate::error::EncodingError;
use crate::protocol::{OFFER_HEADER_SIZE, WRITE_OVERHEAD};

/// Name bytes an offer can carry at `negotiated` MTU. Negative when even
/// the bare header does not fit.
pub fn name_budget(negotiated: usize) -> isize {
    negotiated as isize - WRITE_OVERHEAD as isize - OFFER_HEADER_SIZE as isize
}

/// Encoded name plus a note when it had to be shortened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FittedName {
    pub bytes: Bytes,
    pub truncated: Option<EncodingError>,
}

/// Shorten `name` so the offer fits one write.
///
/// The base name loses characters from its end while the extension is kept.
/// When the extension alone leaves no room, the raw UTF-8 bytes are cut to
/// the budget (or to nothing when the budget is negative).
pub fn fit_file_name(name: &str, negotiated: usize) -> FittedName {
    let budget = name_budget(negotiated);
    let original = name.len();
    if original as isize <= budget {
        return FittedName {
            bytes: Bytes::copy_from_slice(name.as_bytes()),
            truncated: None,
        };
    }

    let (base, extension) = match name.rfind('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    };
    let base_budget = budget - extension.len() as isize;

    let bytes = if base_budget <= 0 {
        let keep = budget.max(0) as usize;
        let bytes = Bytes::copy_from_slice(&name.as_bytes()[..keep]);
        warn!(
            original,
            truncated = bytes.len(),
            "file name and/or extension too long, hard truncating"
        );
        bytes
    } else {
        let mut base = base;
        while base.len() as isize > base_budget {
            let mut chars = base.chars();
            chars.next_back();
            base = chars.as_str();
        }
        let fitted = format!("{base}{extension}");
        warn!(original, name = %fitted, "file name too long, truncating base name");
        Bytes::from(fitted.into_bytes())
    };

    let truncated = (bytes.len() != original).then_some(EncodingError::NameTruncated {
        original,
        truncated: bytes.len(),
    });
    FittedName { bytes, truncated }
}
