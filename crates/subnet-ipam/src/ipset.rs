//! Exact cardinality and range arithmetic over IPv4/IPv6 address sets.
//!
//! Addresses are mapped onto `u128` so both families share one code path.
//! Cardinalities are accumulated with checked arithmetic and converted to the
//! wire width (`i64`) at the end; any value that does not fit is reported as
//! [`ValidationError::CountOverflow`] rather than wrapped.

use crate::error::ValidationError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

fn to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(a) => u128::from(u32::from(a)),
        IpAddr::V6(a) => u128::from(a),
    }
}

/// Rebuild an address of the same family as `like`
fn from_u128(like: IpAddr, value: u128) -> IpAddr {
    match like {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(
            u32::try_from(value).unwrap_or(u32::MAX),
        )),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

fn parse_addr(input: &str) -> Result<IpAddr, ValidationError> {
    input
        .trim()
        .parse::<IpAddr>()
        .map_err(|e| ValidationError::InvalidAddress {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

/// Inclusive range of addresses of a single family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpRange {
    from: IpAddr,
    to: IpAddr,
}

impl IpRange {
    /// Build a range; both ends must share a family and `from <= to`
    pub fn new(from: IpAddr, to: IpAddr) -> Result<Self, ValidationError> {
        if from.is_ipv4() != to.is_ipv4() {
            return Err(ValidationError::MixedFamily { from, to });
        }
        if to_u128(from) > to_u128(to) {
            return Err(ValidationError::InvertedRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Range holding one address
    pub fn single(ip: IpAddr) -> Self {
        Self { from: ip, to: ip }
    }

    /// Parse `"from-to"` or a bare address
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.split_once('-') {
            Some((from, to)) => {
                if from.trim().is_empty() || to.trim().is_empty() {
                    return Err(ValidationError::InvalidRange {
                        input: input.to_string(),
                        reason: "expected two addresses separated by '-'".to_string(),
                    });
                }
                let from = parse_addr(from)?;
                let to = parse_addr(to)?;
                Self::new(from, to)
            }
            None => Ok(Self::single(parse_addr(input)?)),
        }
    }

    pub fn from(&self) -> IpAddr {
        self.from
    }

    pub fn to(&self) -> IpAddr {
        self.to
    }

    /// Number of addresses, `None` only for the full IPv6 space (2^128)
    pub fn size(&self) -> Option<u128> {
        (to_u128(self.to) - to_u128(self.from)).checked_add(1)
    }

    /// Cardinality in the wire width
    pub fn count(&self) -> Result<i64, ValidationError> {
        IpSet::from_ranges([*self]).count()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        ip.is_ipv4() == self.from.is_ipv4()
            && (to_u128(self.from)..=to_u128(self.to)).contains(&to_u128(ip))
    }

    /// Every address in the range, in order
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        (to_u128(self.from)..=to_u128(self.to)).map(|v| from_u128(self.from, v))
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

impl FromStr for IpRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Ordered set of disjoint, non-adjacent ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpSet {
    ranges: Vec<IpRange>,
}

impl IpSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary, possibly overlapping ranges
    pub fn from_ranges(ranges: impl IntoIterator<Item = IpRange>) -> Self {
        let mut set = Self::new();
        for range in ranges {
            set.insert_range(range);
        }
        set
    }

    /// Build from individual addresses
    pub fn from_addrs(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self::from_ranges(addrs.into_iter().map(IpRange::single))
    }

    /// Add a range, merging it with overlapping or adjacent neighbours
    pub fn insert_range(&mut self, range: IpRange) {
        self.ranges.push(range);
        self.ranges.sort_by_key(|r| (r.from.is_ipv6(), to_u128(r.from)));

        let mut merged: Vec<IpRange> = Vec::with_capacity(self.ranges.len());
        for next in self.ranges.drain(..) {
            if let Some(last) = merged.last_mut() {
                let same_family = last.from.is_ipv4() == next.from.is_ipv4();
                let touches = to_u128(last.to)
                    .checked_add(1)
                    .is_none_or(|after| to_u128(next.from) <= after);
                if same_family && touches {
                    if to_u128(next.to) > to_u128(last.to) {
                        last.to = next.to;
                    }
                    continue;
                }
            }
            merged.push(next);
        }
        self.ranges = merged;
    }

    pub fn ranges(&self) -> &[IpRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|r| r.contains(ip))
    }

    /// Total number of addresses, failing if it exceeds `i64::MAX`
    pub fn count(&self) -> Result<i64, ValidationError> {
        let overflow = || ValidationError::CountOverflow { max: i64::MAX };
        let mut total: u128 = 0;
        for range in &self.ranges {
            let size = range.size().ok_or_else(overflow)?;
            total = total.checked_add(size).ok_or_else(overflow)?;
        }
        i64::try_from(total).map_err(|_| overflow())
    }
}

/// Cardinality of an optional set; an absent set counts as zero
pub fn count(set: Option<&IpSet>) -> Result<i64, ValidationError> {
    set.map_or(Ok(0), IpSet::count)
}
