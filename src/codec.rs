//! Single place that knows the dataset container's byte order.
//!
//! The on-disk format mixes big-endian integers with platform-layout
//! (effectively little-endian) floats; every read and write goes through
//! here so no other module ever casts a packed struct over a byte slice.

use crate::error::Error;
use std::io::{Read, Write};

pub fn read_u16_be<R: Read>(r: &mut R) -> Result<u16, Error> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn read_u32_be<R: Read>(r: &mut R) -> Result<u32, Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8, Error> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_f32_native<R: Read>(r: &mut R) -> Result<f32, Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

pub fn read_i16_network<R: Read>(r: &mut R) -> Result<i16, Error> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

pub fn write_u16_be<W: Write>(w: &mut W, v: u16) -> Result<(), Error> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

pub fn write_u32_be<W: Write>(w: &mut W, v: u32) -> Result<(), Error> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<(), Error> {
    w.write_all(&[v])?;
    Ok(())
}

pub fn write_f32_native<W: Write>(w: &mut W, v: f32) -> Result<(), Error> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn write_i16_network<W: Write>(w: &mut W, v: i16) -> Result<(), Error> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}
