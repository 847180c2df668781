// src/rt.rs

//! Runtime utilities for generated code (Macros).
//! Do not use directly.

use crate::codec::{Codec, Field};
use crate::error::{GbxError, Result};

/// Codes a field that only exists for some chunk versions.
///
/// When reading, the slot is filled if `present` and cleared otherwise. When writing,
/// a present field must hold a value: the version was read from the stream or set by
/// the caller, and a missing value would desynchronize every field after it.
pub fn gated<T: Field + Default>(
    ctx: &mut Codec<'_>,
    slot: &mut Option<T>,
    present: bool,
    name: &'static str,
) -> Result<()> {
    gated_with(ctx, slot, present, name, |ctx, v| v.field(ctx))
}

/// [`gated`] with a custom field routine.
pub fn gated_with<T: Default>(
    ctx: &mut Codec<'_>,
    slot: &mut Option<T>,
    present: bool,
    name: &'static str,
    f: impl FnOnce(&mut Codec<'_>, &mut T) -> Result<()>,
) -> Result<()> {
    if ctx.is_reading() {
        *slot = if present {
            let mut value = T::default();
            f(ctx, &mut value)?;
            Some(value)
        } else {
            None
        };
        return Ok(());
    }
    match (present, slot) {
        (true, Some(value)) => f(ctx, value),
        (true, None) => Err(GbxError::Format(format!(
            "field `{name}` is required by this chunk version but holds no value"
        ))),
        (false, _) => Ok(()),
    }
}

/// Lookback query for version-gated `Option<T>` fields.
pub trait Gated {
    /// [`Field::uses_lookback`] of the wrapped type.
    fn uses_lookback() -> bool;
}

impl<T: Field> Gated for Option<T> {
    fn uses_lookback() -> bool {
        T::uses_lookback()
    }
}
