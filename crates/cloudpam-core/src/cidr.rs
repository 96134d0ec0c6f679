//! IPv4 prefix / interval arithmetic.
//!
//! Every algorithm here reduces a CIDR prefix to a half-open... in practice
//! inclusive `[start, end]` 32-bit address interval, represented with `u64`
//! bounds so that the degenerate `/0` block (`[0, 2^32 - 1]`) and one-past-
//! the-end arithmetic never overflow a `u32`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A masked IPv4 prefix: `addr` always has its host bits zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cidr {
    addr: u32,
    prefix_len: u8,
}

impl Cidr {
    /// Construct a prefix from an address and length, masking host bits.
    ///
    /// `prefix_len` must be `<= 32`; this is the kernel-level constraint.
    /// The tighter `8..=30` bound on pool creation is enforced by the
    /// store, not here.
    pub fn new(addr: u32, prefix_len: u8) -> Result<Self, CoreError> {
        if prefix_len > 32 {
            return Err(CoreError::InvalidCidr(format!(
                "prefix length {prefix_len} out of range"
            )));
        }
        Ok(Self {
            addr: addr & mask_for(prefix_len),
            prefix_len,
        })
    }

    /// Parse a CIDR string of the form `a.b.c.d/N`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (addr_part, len_part) = s
            .split_once('/')
            .ok_or_else(|| CoreError::InvalidCidr(s.to_string()))?;

        let prefix_len: u8 = len_part
            .parse()
            .map_err(|_| CoreError::InvalidCidr(s.to_string()))?;
        if prefix_len > 32 {
            return Err(CoreError::InvalidCidr(s.to_string()));
        }

        let octets: Vec<&str> = addr_part.split('.').collect();
        if octets.len() != 4 {
            return Err(CoreError::InvalidCidr(s.to_string()));
        }
        let mut addr: u32 = 0;
        for part in octets {
            let byte: u32 = part
                .parse::<u8>()
                .map_err(|_| CoreError::InvalidCidr(s.to_string()))?
                .into();
            addr = (addr << 8) | byte;
        }

        Self::new(addr, prefix_len)
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// First address in the block.
    pub fn start(&self) -> u64 {
        self.addr as u64
    }

    /// Last address in the block (inclusive).
    pub fn end(&self) -> u64 {
        self.start() + self.address_count() - 1
    }

    /// Number of addresses covered, `2^(32 - prefix_len)`.
    pub fn address_count(&self) -> u64 {
        1u64 << (32 - self.prefix_len as u32)
    }

    /// True iff `self`'s interval fully contains `other`'s.
    pub fn contains(&self, other: &Cidr) -> bool {
        self.start() <= other.start() && other.end() <= self.end()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.addr;
        write!(
            f,
            "{}.{}.{}.{}/{}",
            (a >> 24) & 0xFF,
            (a >> 16) & 0xFF,
            (a >> 8) & 0xFF,
            a & 0xFF,
            self.prefix_len
        )
    }
}

fn mask_for(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        (!0u32) << (32 - prefix_len as u32)
    }
}

/// `prefixesOverlap` — overlap iff the masked intervals intersect.
pub fn prefixes_overlap(a: &Cidr, b: &Cidr) -> bool {
    a.start() <= b.end() && b.start() <= a.end()
}

/// `prefixAddressCount` as a free function, for callers holding only a `Cidr`.
pub fn prefix_address_count(p: &Cidr) -> u64 {
    p.address_count()
}

const RFC1918_BLOCKS: [(u32, u8); 3] = [
    (0x0A000000, 8),  // 10.0.0.0/8
    (0xAC100000, 12), // 172.16.0.0/12
    (0xC0A80000, 16), // 192.168.0.0/16
];

/// `isRFC1918` — true iff `p` is fully contained in one of the three
/// private-use blocks.
pub fn is_rfc1918(p: &Cidr) -> bool {
    RFC1918_BLOCKS.iter().any(|&(addr, len)| {
        let block = Cidr::new(addr, len).expect("static RFC1918 block is valid");
        block.contains(p)
    })
}

/// `rangeToCIDRs` — decompose an inclusive address range into the minimal
/// ordered set of CIDR-aligned prefixes that exactly cover it.
///
/// At each step, emits the largest block whose size is simultaneously
/// bounded by the alignment of `start` (trailing zero bits) and by how
/// much of the remaining range it fits in (`floor(log2(remaining))`).
pub fn range_to_cidrs(start: u64, end: u64) -> Vec<Cidr> {
    if start > end {
        return Vec::new();
    }

    let mut blocks = Vec::new();
    let mut cursor = start;

    loop {
        let span = end - cursor + 1;
        let fit_bits = span.ilog2();
        let align_bits = if cursor == 0 {
            32
        } else {
            (cursor as u32).trailing_zeros().min(32)
        };
        let size_bits = align_bits.min(fit_bits).min(32);
        let prefix_len = (32 - size_bits) as u8;

        let block = Cidr::new(cursor as u32, prefix_len).expect("computed prefix_len is <= 32");
        blocks.push(block);

        let block_size = 1u64 << size_bits;
        let next = cursor + block_size;
        if next > end || next <= cursor {
            break;
        }
        cursor = next;
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ip(s: &str) -> u64 {
        Cidr::parse(&format!("{s}/32")).unwrap().start()
    }

    #[test]
    fn parses_and_displays() {
        let c = Cidr::parse("10.0.0.0/24").unwrap();
        assert_eq!(c.to_string(), "10.0.0.0/24");
        assert_eq!(c.address_count(), 256);
    }

    #[test]
    fn parse_masks_host_bits() {
        let c = Cidr::parse("10.0.0.5/24").unwrap();
        assert_eq!(c.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Cidr::parse("not-a-cidr").is_err());
        assert!(Cidr::parse("10.0.0.0/33").is_err());
        assert!(Cidr::parse("10.0.0.0.0/24").is_err());
    }

    #[test]
    fn overlap_detects_intersection() {
        let a = Cidr::parse("10.0.0.0/24").unwrap();
        let b = Cidr::parse("10.0.0.128/25").unwrap();
        let c = Cidr::parse("10.0.1.0/24").unwrap();
        assert!(prefixes_overlap(&a, &b));
        assert!(!prefixes_overlap(&a, &c));
    }

    #[test]
    fn rfc1918_containment() {
        assert!(is_rfc1918(&Cidr::parse("10.1.2.0/24").unwrap()));
        assert!(is_rfc1918(&Cidr::parse("172.16.5.0/24").unwrap()));
        assert!(is_rfc1918(&Cidr::parse("192.168.1.0/24").unwrap()));
        assert!(!is_rfc1918(&Cidr::parse("8.8.8.0/24").unwrap()));
        // straddles the boundary of 172.16/12 — not fully contained
        assert!(!is_rfc1918(&Cidr::parse("172.0.0.0/8").unwrap()));
    }

    #[test]
    fn range_to_cidrs_whole_space() {
        let blocks = range_to_cidrs(0, u32::MAX as u64);
        assert_eq!(blocks, vec![Cidr::parse("0.0.0.0/0").unwrap()]);
    }

    #[test]
    fn range_to_cidrs_two_aligned_halves() {
        let start = ip("10.0.0.128");
        let end = ip("10.0.1.127");
        let blocks = range_to_cidrs(start, end);
        assert_eq!(
            blocks,
            vec![
                Cidr::parse("10.0.0.128/25").unwrap(),
                Cidr::parse("10.0.1.0/25").unwrap(),
            ]
        );
    }

    #[test]
    fn range_to_cidrs_small_misaligned_range() {
        let start = ip("10.0.0.1");
        let end = ip("10.0.0.3");
        let blocks = range_to_cidrs(start, end);
        assert_eq!(
            blocks,
            vec![
                Cidr::parse("10.0.0.1/32").unwrap(),
                Cidr::parse("10.0.0.2/31").unwrap(),
            ]
        );
    }

    #[test]
    fn range_to_cidrs_empty_on_inverted_range() {
        assert!(range_to_cidrs(10, 5).is_empty());
    }

    proptest! {
        #[test]
        fn decomposition_is_exact_and_disjoint_and_ordered(
            start in 0u64..=u32::MAX as u64,
            len in 0u64..=65535,
        ) {
            let end = (start + len).min(u32::MAX as u64);
            let blocks = range_to_cidrs(start, end);

            // exact coverage
            let total: u64 = blocks.iter().map(|b| b.address_count()).sum();
            prop_assert_eq!(total, end - start + 1);

            // ordered, non-overlapping, contiguous
            let mut cursor = start;
            for block in &blocks {
                prop_assert_eq!(block.start(), cursor);
                cursor = block.end() + 1;
            }
            prop_assert_eq!(cursor, end + 1);
        }

        #[test]
        fn decomposition_is_minimal_cardinality(
            start in 0u64..=u32::MAX as u64,
            len in 0u64..=4095,
        ) {
            let end = (start + len).min(u32::MAX as u64);
            let blocks = range_to_cidrs(start, end);

            // No block could have been doubled in size: the first block's
            // size is already the maximum allowed by alignment and fit, so
            // no coarser aligned decomposition of the same range exists.
            if let Some(first) = blocks.first() {
                let span = end - start + 1;
                let align_bits = if start == 0 { 32 } else { (start as u32).trailing_zeros() };
                let max_possible = align_bits.min(span.ilog2());
                prop_assert_eq!(32 - first.prefix_len() as u32, max_possible);
            }
        }
    }
}
