use glam::{IVec3, Quat, Vec2, Vec3, Vec4};

use super::{Codec, TimeInt, TimeSingle};
use crate::error::Result;
use crate::ident::{Id, Ident};

/// A value with one canonical wire encoding.
///
/// `#[derive(ReadWrite)]` codes every struct field through this trait unless the field
/// carries a `#[gbx(with = "...")]` override. Derived structs implement it too, so they
/// nest inside other chunks and arrays.
pub trait Field {
    /// Codes the value in the direction of `ctx`.
    fn field(&mut self, ctx: &mut Codec<'_>) -> Result<()>;

    /// Whether coding this type can read or extend the Id and node lookback tables.
    fn uses_lookback() -> bool
    where
        Self: Sized,
    {
        true
    }
}

macro_rules! impl_field {
    ($($ty:ty => $op:ident, $lookback:expr);* $(;)?) => {
        $(
            impl Field for $ty {
                fn field(&mut self, ctx: &mut Codec<'_>) -> Result<()> {
                    ctx.$op(self)
                }

                fn uses_lookback() -> bool {
                    $lookback
                }
            }
        )*
    };
}

impl_field! {
    u8 => u8, false;
    u16 => u16, false;
    u32 => u32, false;
    i32 => i32, false;
    u64 => u64, false;
    f32 => f32, false;
    bool => boolean, false;
    String => string, false;
    Id => id, true;
    Ident => ident, true;
    TimeInt => time_int, false;
    TimeSingle => time_single, false;
    Vec2 => vec2, false;
    Vec3 => vec3, false;
    Vec4 => vec4, false;
    Quat => quat, false;
    IVec3 => int3, false;
}

impl<T: Field + Default> Field for Vec<T> {
    fn field(&mut self, ctx: &mut Codec<'_>) -> Result<()> {
        ctx.array(self, |ctx, item| item.field(ctx))
    }

    fn uses_lookback() -> bool {
        T::uses_lookback()
    }
}

impl<const N: usize> Field for [u8; N] {
    fn field(&mut self, ctx: &mut Codec<'_>) -> Result<()> {
        ctx.fixed(self)
    }

    fn uses_lookback() -> bool {
        false
    }
}

impl<T: Field> Field for Box<T> {
    fn field(&mut self, ctx: &mut Codec<'_>) -> Result<()> {
        (**self).field(ctx)
    }

    fn uses_lookback() -> bool {
        T::uses_lookback()
    }
}
