//! Formatting of panic payloads caught from call tasks.

use std::{any::Any, fmt};

/// Display adapter for a caught panic payload.
///
/// `String` and `&'static str` payloads print as-is; anything else prints
/// through its `Debug` representation.
///
/// ```
/// use weft::panic::format_panic;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(payload.as_ref()).to_string(), "boom");
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
/// assert_eq!(format_panic(payload.as_ref()).to_string(), "bang");
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Borrow `payload` as a displayable [`PanicMessage`].
///
/// Pass the boxed payload's contents (`payload.as_ref()`), not the box itself.
pub fn format_panic(payload: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(payload) }

#[cfg(test)]
mod tests {
    use super::format_panic;

    #[test]
    fn opaque_payload_falls_back_to_debug() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(5_u32);
        assert!(format_panic(payload.as_ref()).to_string().contains("Any"));
    }
}
