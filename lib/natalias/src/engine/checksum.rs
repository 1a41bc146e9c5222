// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The internet checksum, computed in full or updated differentially.
//!
//! [`Checksum`] is a rolling one's complement sum with deferred carry
//! folding. [`HeaderChecksum`] is the finalized, complemented value as
//! it sits in a header. Rewriting a handful of header words (an
//! address, a port, a length) only needs the old and new bytes of those
//! words: subtract the old, add the new, fold, complement. That is
//! O(changed words) rather than O(packet).
//!
//! # Byte order
//!
//! The checksum is a pair of bytes, not a number. Both the summed words
//! and the stored result are handled in native byte order
//! (`{to,from}_ne_bytes()`), which yields the correct network-order
//! result on either endianness (RFC 1071 §1.B). Never byte-swap the
//! checksum field itself. Callers that read the field through an
//! accessor returning a host `u16` convert with `to_be_bytes()` before
//! handing it to this module, see [`update`].
//!
//! # Relevant RFCs
//!
//! * 1071 Computing the Internet Checksum
//!
//! * 1141 Incremental Updating of the Internet Checksum
//!
//! * 1624 Computation of the Internet Checksum via Incremental Update

use std::net::Ipv4Addr;

/// The checksum value as contained in a network header: the one's
/// complement of the folded sum.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderChecksum {
    inner: [u8; 2],
}

impl HeaderChecksum {
    /// Return the bytes of this header checksum.
    pub fn bytes(&self) -> [u8; 2] {
        self.inner
    }

    /// Wrap the checksum bytes found in a header.
    pub fn wrap(hc: [u8; 2]) -> Self {
        Self { inner: hc }
    }

    /// Wrap a checksum field read as a host-order `u16`.
    pub fn from_field(field: u16) -> Self {
        Self { inner: field.to_be_bytes() }
    }

    /// The value to write back through a host-order `u16` setter.
    pub fn to_field(&self) -> u16 {
        u16::from_be_bytes(self.inner)
    }
}

impl From<Checksum> for HeaderChecksum {
    /// Finalize the rolling checksum and complement it.
    fn from(mut csum: Checksum) -> HeaderChecksum {
        Self { inner: (!csum.finalize()).to_ne_bytes() }
    }
}

/// A rolling one's complement checksum calculation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Checksum {
    inner: u32,
}

impl Checksum {
    /// Creates a new checksum counter.
    pub fn new() -> Self {
        Self::from(0)
    }

    /// Add the contents of `bytes` to the sum.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_add(self.inner, bytes);
    }

    /// Create a new rolling checksum, starting with `bytes`.
    pub fn compute(bytes: &[u8]) -> Self {
        Self { inner: csum_add(0, bytes) }
    }

    /// Remove the contents of `bytes` from the sum.
    pub fn sub_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_sub(self.inner, bytes);
    }

    /// Fold all the accumulated carries and return the 16-bit sum.
    pub fn finalize(&mut self) -> u16 {
        while (self.inner >> 16) != 0 {
            self.inner = (self.inner >> 16) + (self.inner & 0xFFFF);
        }

        (self.inner & 0xFFFF) as u16
    }
}

impl From<HeaderChecksum> for Checksum {
    fn from(hc: HeaderChecksum) -> Self {
        Self { inner: (!u16::from_ne_bytes(hc.bytes())) as u32 }
    }
}

impl From<u32> for Checksum {
    fn from(csum: u32) -> Self {
        Self { inner: csum }
    }
}

impl core::ops::AddAssign for Checksum {
    fn add_assign(&mut self, other: Self) {
        let mut other = other;
        let folded = other.finalize().to_ne_bytes();
        self.add_bytes(&folded);
    }
}

fn csum_add(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        csum += u16::from_ne_bytes([pair[0], pair[1]]) as u32;
        csum = fold_once(csum);
    }

    if let [last] = chunks.remainder() {
        csum += u16::from_ne_bytes([*last, 0]) as u32;
    }

    csum
}

fn csum_sub(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        csum += (!u16::from_ne_bytes([pair[0], pair[1]])) as u32;
        csum = fold_once(csum);
    }

    if let [last] = chunks.remainder() {
        csum += (!u16::from_ne_bytes([*last, 0])) as u32;
    }

    csum
}

// Keep the accumulator from overflowing on long buffers.
#[inline]
fn fold_once(csum: u32) -> u32 {
    if csum > 0xFFFF_0000 { (csum >> 16) + (csum & 0xFFFF) } else { csum }
}

/// Differentially update a header checksum field.
///
/// `field` is the checksum as read through a host-order accessor,
/// `old` and `new` are the network-order bytes of the words being
/// replaced. Both must be the same even length.
pub fn update(field: u16, old: &[u8], new: &[u8]) -> u16 {
    debug_assert_eq!(old.len(), new.len());
    debug_assert_eq!(old.len() % 2, 0);
    let mut csum = Checksum::from(HeaderChecksum::from_field(field));
    csum.sub_bytes(old);
    csum.add_bytes(new);
    HeaderChecksum::from(csum).to_field()
}

/// Update for a rewritten IPv4 address.
pub fn update_addr(field: u16, old: Ipv4Addr, new: Ipv4Addr) -> u16 {
    update(field, &old.octets(), &new.octets())
}

/// Update for a rewritten 16-bit value (port, identifier, length).
pub fn update_u16(field: u16, old: u16, new: u16) -> u16 {
    update(field, &old.to_be_bytes(), &new.to_be_bytes())
}

/// Update for a rewritten 32-bit value (sequence or ack number).
pub fn update_u32(field: u16, old: u32, new: u32) -> u16 {
    update(field, &old.to_be_bytes(), &new.to_be_bytes())
}

/// Compute the checksum of `bytes` from scratch, as a host-order field
/// value. The checksum field inside `bytes` must be zeroed.
pub fn compute_field(bytes: &[u8]) -> u16 {
    HeaderChecksum::from(Checksum::compute(bytes)).to_field()
}

/// Compute a TCP or UDP checksum over the IPv4 pseudo-header and the
/// segment. The checksum field inside `segment` must be zeroed.
pub fn l4_field(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, segment: &[u8]) -> u16 {
    let mut csum = Checksum::new();
    csum.add_bytes(&src.octets());
    csum.add_bytes(&dst.octets());
    csum.add_bytes(&[0, proto]);
    // Segments never exceed an IPv4 total length.
    let len = segment.len() as u16;
    csum.add_bytes(&len.to_be_bytes());
    csum.add_bytes(segment);
    HeaderChecksum::from(csum).to_field()
}
