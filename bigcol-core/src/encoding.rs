//! Conversion between Arrow arrays and the little endian element bytes stored in shards.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray, BooleanArray, FixedSizeListArray, PrimitiveArray},
    datatypes::{
        Field, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
        UInt32Type, UInt64Type, UInt8Type,
    },
};

use crate::{
    dtype::{DType, ScalarKind},
    error::{BigColError, BigColResult},
};

macro_rules! encode_primitive {
    ($array:expr, $arrow_ty:ty) => {{
        let values = $array.as_primitive_opt::<$arrow_ty>().ok_or_else(|| {
            BigColError::UnsupportedDataType(format!(
                "expected {} values, got {}",
                stringify!($arrow_ty),
                $array.data_type()
            ))
        })?;
        let mut out = Vec::with_capacity(std::mem::size_of_val(&values.values()[..]));
        for value in values.values().iter() {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }};
}

macro_rules! decode_primitive {
    ($bytes:expr, $arrow_ty:ty, $native:ty) => {{
        const WIDTH: usize = std::mem::size_of::<$native>();
        let values = $bytes.chunks_exact(WIDTH).map(|chunk| {
            let mut raw = [0u8; WIDTH];
            raw.copy_from_slice(chunk);
            <$native>::from_le_bytes(raw)
        });
        Arc::new(PrimitiveArray::<$arrow_ty>::from_iter_values(values)) as ArrayRef
    }};
}

fn encode_scalars(kind: ScalarKind, values: &dyn Array) -> BigColResult<Vec<u8>> {
    if values.null_count() > 0 {
        return Err(BigColError::UnsupportedDataType(format!(
            "arrays with null values cannot be stored ({} nulls)",
            values.null_count()
        )));
    }
    let bytes = match kind {
        ScalarKind::Bool => {
            let values = values.as_boolean_opt().ok_or_else(|| {
                BigColError::UnsupportedDataType(format!(
                    "expected boolean values, got {}",
                    values.data_type()
                ))
            })?;
            values.values().iter().map(u8::from).collect()
        }
        ScalarKind::I8 => encode_primitive!(values, Int8Type),
        ScalarKind::I16 => encode_primitive!(values, Int16Type),
        ScalarKind::I32 => encode_primitive!(values, Int32Type),
        ScalarKind::I64 => encode_primitive!(values, Int64Type),
        ScalarKind::U8 => encode_primitive!(values, UInt8Type),
        ScalarKind::U16 => encode_primitive!(values, UInt16Type),
        ScalarKind::U32 => encode_primitive!(values, UInt32Type),
        ScalarKind::U64 => encode_primitive!(values, UInt64Type),
        ScalarKind::F32 => encode_primitive!(values, Float32Type),
        ScalarKind::F64 => encode_primitive!(values, Float64Type),
    };
    Ok(bytes)
}

fn decode_scalars(kind: ScalarKind, bytes: &[u8]) -> ArrayRef {
    match kind {
        ScalarKind::Bool => Arc::new(BooleanArray::from(
            bytes.iter().map(|b| *b != 0).collect::<Vec<_>>(),
        )),
        ScalarKind::I8 => decode_primitive!(bytes, Int8Type, i8),
        ScalarKind::I16 => decode_primitive!(bytes, Int16Type, i16),
        ScalarKind::I32 => decode_primitive!(bytes, Int32Type, i32),
        ScalarKind::I64 => decode_primitive!(bytes, Int64Type, i64),
        ScalarKind::U8 => decode_primitive!(bytes, UInt8Type, u8),
        ScalarKind::U16 => decode_primitive!(bytes, UInt16Type, u16),
        ScalarKind::U32 => decode_primitive!(bytes, UInt32Type, u32),
        ScalarKind::U64 => decode_primitive!(bytes, UInt64Type, u64),
        ScalarKind::F32 => decode_primitive!(bytes, Float32Type, f32),
        ScalarKind::F64 => decode_primitive!(bytes, Float64Type, f64),
    }
}

/// Serializes `array` into element bytes. The caller has already checked that
/// `array` has dtype `dtype`.
pub fn encode(dtype: &DType, array: &dyn Array) -> BigColResult<Vec<u8>> {
    if dtype.nmemb() == 1 {
        return encode_scalars(dtype.kind(), array);
    }

    if array.null_count() > 0 {
        return Err(BigColError::UnsupportedDataType(
            "fixed size lists with null elements cannot be stored".to_string(),
        ));
    }
    let list = array
        .as_fixed_size_list_opt()
        .ok_or_else(|| BigColError::UnsupportedDataType(array.data_type().to_string()))?;
    let start = list.value_offset(0).max(0) as usize;
    let values = list.values().slice(start, list.len() * dtype.nmemb());
    encode_scalars(dtype.kind(), values.as_ref())
}

/// Builds an Arrow array of dtype `dtype` from element bytes.
pub fn decode(dtype: &DType, bytes: &[u8]) -> BigColResult<ArrayRef> {
    if bytes.len() % dtype.itemsize() != 0 {
        return Err(BigColError::InvalidArgument(format!(
            "{} bytes is not a whole number of {} elements",
            bytes.len(),
            dtype
        )));
    }

    let values = decode_scalars(dtype.kind(), bytes);
    if dtype.nmemb() == 1 {
        return Ok(values);
    }

    let field = Arc::new(Field::new("item", dtype.kind().arrow_type(), false));
    let list = FixedSizeListArray::try_new(field, dtype.nmemb() as i32, values, None)?;
    Ok(Arc::new(list))
}
