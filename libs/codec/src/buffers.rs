//! Scatter-gather buffer views
//!
//! A scatter-gather buffer presents an ordered set of disjoint byte spans as
//! one logical address range. The codec never touches memory any other way:
//! readers walk a [`ScatterGatherBuffer`], writers fill a
//! [`ScatterGatherBufferMut`], and every field access is a logical-range copy
//! that may cross span boundaries.
//!
//! ```text
//! logical:  [0 ......................................... total_length)
//! spans:    [ span 0 ][ span 1 ][   span 2   ][ span 3 ]
//! ```
//!
//! Views only borrow their spans. Nothing here allocates.
//!
//! Typed access goes through [`WireScalar`] so there is one generic routine
//! for every numeric kind instead of one per type.

use crate::error::{ProtocolError, ProtocolResult};
use rrlite_types::WireScalar;

#[derive(Debug, Clone, Copy)]
enum Spans<'a> {
    Single(&'a [u8]),
    Vectored(&'a [&'a [u8]]),
}

/// Read-only logical view over one or more byte spans
#[derive(Debug, Clone, Copy)]
pub struct ScatterGatherBuffer<'a> {
    spans: Spans<'a>,
}

impl<'a> ScatterGatherBuffer<'a> {
    pub const fn single(data: &'a [u8]) -> Self {
        Self {
            spans: Spans::Single(data),
        }
    }

    pub const fn vectored(spans: &'a [&'a [u8]]) -> Self {
        Self {
            spans: Spans::Vectored(spans),
        }
    }

    /// Sum of all span lengths
    pub fn total_length(&self) -> usize {
        match self.spans {
            Spans::Single(data) => data.len(),
            Spans::Vectored(spans) => spans.iter().map(|s| s.len()).sum(),
        }
    }

    pub fn span_count(&self) -> usize {
        match self.spans {
            Spans::Single(_) => 1,
            Spans::Vectored(spans) => spans.len(),
        }
    }

    fn span(&self, index: usize) -> &'a [u8] {
        match self.spans {
            Spans::Single(data) => data,
            Spans::Vectored(spans) => spans[index],
        }
    }

    fn as_single(&self) -> Option<&'a [u8]> {
        match self.spans {
            Spans::Single(data) => Some(data),
            Spans::Vectored([only]) => Some(*only),
            Spans::Vectored(_) => None,
        }
    }

    /// Span index and offset within it for a logical byte position
    fn locate(&self, pos: usize) -> (usize, usize) {
        let mut remaining = pos;
        for index in 0..self.span_count() {
            let len = self.span(index).len();
            if remaining < len {
                return (index, remaining);
            }
            remaining -= len;
        }
        (self.span_count(), remaining)
    }

    /// Borrow `len` bytes at `pos` directly when they sit inside one span
    pub fn contiguous(&self, pos: usize, len: usize) -> Option<&'a [u8]> {
        let end = pos.checked_add(len)?;
        if end > self.total_length() {
            return None;
        }
        if len == 0 {
            return Some(&[]);
        }
        let (index, offset) = self.locate(pos);
        let span = self.span(index);
        span.get(offset..offset + len)
    }

    /// Copy `dest.len()` bytes starting at `pos` into `dest`
    pub fn read_into(&self, pos: usize, dest: &mut [u8]) -> ProtocolResult<()> {
        let len = dest.len();
        copy(
            self,
            pos,
            &mut ScatterGatherBufferMut::single(dest),
            0,
            len,
        )
    }

    pub fn read_u16(&self, pos: usize) -> ProtocolResult<u16> {
        let mut raw = [0u8; 2];
        self.read_into(pos, &mut raw)?;
        Ok(u16::from_ne_bytes(raw))
    }

    pub fn read_u32(&self, pos: usize) -> ProtocolResult<u32> {
        let mut raw = [0u8; 4];
        self.read_into(pos, &mut raw)?;
        Ok(u32::from_ne_bytes(raw))
    }

    /// Copy wire bytes at `pos` into a typed array
    pub fn read_typed<T: WireScalar>(&self, pos: usize, dest: &mut [T]) -> ProtocolResult<()> {
        let count = dest.len();
        let elem_size = std::mem::size_of::<T>();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(dest);
        copy_typed(
            self,
            pos,
            1,
            count * elem_size,
            &mut ScatterGatherBufferMut::single(bytes),
            0,
            elem_size,
            count,
        )
    }
}

#[derive(Debug)]
enum SpansMut<'a, 'b> {
    Single(&'a mut [u8]),
    Vectored(&'a mut [&'b mut [u8]]),
}

/// Writable logical view over one or more byte spans
#[derive(Debug)]
pub struct ScatterGatherBufferMut<'a, 'b> {
    spans: SpansMut<'a, 'b>,
}

impl<'a, 'b> ScatterGatherBufferMut<'a, 'b> {
    pub fn single(data: &'a mut [u8]) -> Self {
        Self {
            spans: SpansMut::Single(data),
        }
    }

    pub fn vectored(spans: &'a mut [&'b mut [u8]]) -> Self {
        Self {
            spans: SpansMut::Vectored(spans),
        }
    }

    pub fn total_length(&self) -> usize {
        match &self.spans {
            SpansMut::Single(data) => data.len(),
            SpansMut::Vectored(spans) => spans.iter().map(|s| s.len()).sum(),
        }
    }

    pub fn span_count(&self) -> usize {
        match &self.spans {
            SpansMut::Single(_) => 1,
            SpansMut::Vectored(spans) => spans.len(),
        }
    }

    fn span_len(&self, index: usize) -> usize {
        match &self.spans {
            SpansMut::Single(data) => data.len(),
            SpansMut::Vectored(spans) => spans[index].len(),
        }
    }

    fn span_mut(&mut self, index: usize) -> &mut [u8] {
        match &mut self.spans {
            SpansMut::Single(data) => &mut data[..],
            SpansMut::Vectored(spans) => &mut spans[index][..],
        }
    }

    fn as_single_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.spans {
            SpansMut::Single(data) => Some(&mut data[..]),
            SpansMut::Vectored([only]) => Some(&mut only[..]),
            SpansMut::Vectored(_) => None,
        }
    }

    fn locate(&self, pos: usize) -> (usize, usize) {
        let mut remaining = pos;
        for index in 0..self.span_count() {
            let len = self.span_len(index);
            if remaining < len {
                return (index, remaining);
            }
            remaining -= len;
        }
        (self.span_count(), remaining)
    }

    /// Read-only view of the same spans, when they are a single slice
    pub fn as_single(&self) -> Option<&[u8]> {
        match &self.spans {
            SpansMut::Single(data) => Some(&data[..]),
            SpansMut::Vectored([only]) => Some(&only[..]),
            SpansMut::Vectored(_) => None,
        }
    }

    /// Copy `src` into the buffer at `pos`
    pub fn write_from(&mut self, pos: usize, src: &[u8]) -> ProtocolResult<()> {
        copy(&ScatterGatherBuffer::single(src), 0, self, pos, src.len())
    }

    pub fn write_u16(&mut self, pos: usize, value: u16) -> ProtocolResult<()> {
        self.write_from(pos, &value.to_ne_bytes())
    }

    pub fn write_u32(&mut self, pos: usize, value: u32) -> ProtocolResult<()> {
        self.write_from(pos, &value.to_ne_bytes())
    }

    /// Copy a typed array out to wire bytes at `pos`
    pub fn write_typed<T: WireScalar>(&mut self, pos: usize, src: &[T]) -> ProtocolResult<()> {
        let elem_size = std::mem::size_of::<T>();
        let bytes: &[u8] = bytemuck::cast_slice(src);
        copy_typed(
            &ScatterGatherBuffer::single(bytes),
            0,
            elem_size,
            src.len(),
            self,
            pos,
            1,
            src.len() * elem_size,
        )
    }
}

fn check_range(pos: usize, count: usize, total: usize, context: &'static str) -> ProtocolResult<()> {
    match pos.checked_add(count) {
        Some(end) if end <= total => Ok(()),
        _ => Err(ProtocolError::out_of_range(context)),
    }
}

/// Copy `count` bytes from logical `src[src_pos..]` to logical `dst[dst_pos..]`
///
/// Both ranges are validated before anything is written, so a failed copy
/// leaves the destination untouched.
pub fn copy(
    src: &ScatterGatherBuffer<'_>,
    src_pos: usize,
    dst: &mut ScatterGatherBufferMut<'_, '_>,
    dst_pos: usize,
    count: usize,
) -> ProtocolResult<()> {
    check_range(src_pos, count, src.total_length(), "copy source range")?;
    check_range(dst_pos, count, dst.total_length(), "copy destination range")?;
    if count == 0 {
        return Ok(());
    }

    // Fast path: one span on each side
    if let Some(source) = src.as_single() {
        if let Some(dest) = dst.as_single_mut() {
            dest[dst_pos..dst_pos + count].copy_from_slice(&source[src_pos..src_pos + count]);
            return Ok(());
        }
    }

    let (mut src_index, mut src_offset) = src.locate(src_pos);
    let (mut dst_index, mut dst_offset) = dst.locate(dst_pos);
    let mut remaining = count;

    while remaining > 0 {
        let source = src.span(src_index);
        let dst_len = dst.span_len(dst_index);
        let step = (source.len() - src_offset)
            .min(dst_len - dst_offset)
            .min(remaining);

        if step > 0 {
            let dest = dst.span_mut(dst_index);
            dest[dst_offset..dst_offset + step]
                .copy_from_slice(&source[src_offset..src_offset + step]);
        }

        remaining -= step;
        src_offset += step;
        dst_offset += step;

        if src_offset == source.len() {
            src_index += 1;
            src_offset = 0;
        }
        if dst_offset == dst_len {
            dst_index += 1;
            dst_offset = 0;
        }
    }

    Ok(())
}

/// Element-addressed copy between buffers with different item sizes
///
/// Positions are in items of each side's element size. The byte extent of
/// both sides must agree.
#[allow(clippy::too_many_arguments)]
pub fn copy_typed(
    src: &ScatterGatherBuffer<'_>,
    src_pos: usize,
    src_elem_size: usize,
    src_count: usize,
    dst: &mut ScatterGatherBufferMut<'_, '_>,
    dst_pos: usize,
    dst_elem_size: usize,
    dst_count: usize,
) -> ProtocolResult<()> {
    let src_bytes = src_count
        .checked_mul(src_elem_size)
        .ok_or(ProtocolError::out_of_range("source extent overflow"))?;
    let dst_bytes = dst_count
        .checked_mul(dst_elem_size)
        .ok_or(ProtocolError::out_of_range("destination extent overflow"))?;
    if src_bytes != dst_bytes {
        return Err(ProtocolError::out_of_range("copy extents differ"));
    }

    let src_byte_pos = src_pos
        .checked_mul(src_elem_size)
        .ok_or(ProtocolError::out_of_range("source position overflow"))?;
    let dst_byte_pos = dst_pos
        .checked_mul(dst_elem_size)
        .ok_or(ProtocolError::out_of_range("destination position overflow"))?;

    copy(src, src_byte_pos, dst, dst_byte_pos, src_bytes)
}
