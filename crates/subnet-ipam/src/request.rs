//! Reserve and release payload construction.
//!
//! A [`ReservationRequest`] can only be obtained through the builder
//! functions, which validate their input up front. Once built it is
//! immutable and converts into the wire spec for either direction.

use crate::error::ValidationError;
use crate::ipset::IpRange;
use prism_client::{IpAddress, IpReserveSpec, IpUnreserveSpec, ReserveType, UnreserveType};
use std::net::IpAddr;

/// Shape of a reservation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Let the remote allocator pick `n` addresses
    Count(u64),
    /// Explicit literal addresses
    List(Vec<IpAddr>),
    /// Contiguous range with its advertised cardinality
    Range { range: IpRange, count: i64 },
    /// Whatever was reserved under this client context
    ReleaseByContext(String),
}

/// Validated, immutable reserve/release request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    kind: RequestKind,
}

impl ReservationRequest {
    /// Reserve `n >= 1` addresses chosen by the remote allocator
    pub fn count(n: u64) -> Result<Self, ValidationError> {
        if n == 0 {
            return Err(ValidationError::InvalidCount(n));
        }
        if i64::try_from(n).is_err() {
            return Err(ValidationError::CountOverflow { max: i64::MAX });
        }
        Ok(Self {
            kind: RequestKind::Count(n),
        })
    }

    /// Explicit address literals; every entry must parse
    pub fn list<I, S>(addrs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = addrs
            .into_iter()
            .map(|a| {
                let a = a.as_ref();
                a.trim()
                    .parse::<IpAddr>()
                    .map_err(|e| ValidationError::InvalidAddress {
                        input: a.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::addresses(parsed)
    }

    /// Explicit, already parsed addresses
    pub fn addresses(addrs: Vec<IpAddr>) -> Result<Self, ValidationError> {
        if addrs.is_empty() {
            return Err(ValidationError::EmptyList);
        }
        Ok(Self {
            kind: RequestKind::List(addrs),
        })
    }

    /// Contiguous range `from..=to`
    pub fn range(from: IpAddr, to: IpAddr) -> Result<Self, ValidationError> {
        Self::from_range(IpRange::new(from, to)?)
    }

    /// Contiguous range parsed from `"from-to"` or a single literal
    pub fn parse_range(spec: &str) -> Result<Self, ValidationError> {
        Self::from_range(IpRange::parse(spec)?)
    }

    fn from_range(range: IpRange) -> Result<Self, ValidationError> {
        let count = range.count()?;
        Ok(Self {
            kind: RequestKind::Range { range, count },
        })
    }

    /// Release everything reserved under `context`
    pub fn release_by_context(context: impl Into<String>) -> Result<Self, ValidationError> {
        let context = context.into();
        if context.trim().is_empty() {
            return Err(ValidationError::EmptyContext);
        }
        Ok(Self {
            kind: RequestKind::ReleaseByContext(context),
        })
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Count sent to the remote side, where the shape carries one
    pub fn advertised_count(&self) -> Option<i64> {
        match &self.kind {
            RequestKind::Count(n) => i64::try_from(*n).ok(),
            RequestKind::Range { count, .. } => Some(*count),
            RequestKind::List(_) | RequestKind::ReleaseByContext(_) => None,
        }
    }

    /// Body for `reserve-ips`, tagging the reservation with `client_context`
    pub fn to_reserve_spec(
        &self,
        client_context: Option<&str>,
    ) -> Result<IpReserveSpec, ValidationError> {
        let client_context = client_context
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let spec = match &self.kind {
            RequestKind::Count(n) => IpReserveSpec {
                reserve_type: ReserveType::IpAddressCount,
                count: Some(
                    i64::try_from(*n).map_err(|_| ValidationError::CountOverflow { max: i64::MAX })?,
                ),
                start_ip_address: None,
                ip_addresses: Vec::new(),
                client_context,
            },
            RequestKind::List(addrs) => IpReserveSpec {
                reserve_type: ReserveType::IpAddressList,
                count: None,
                start_ip_address: None,
                ip_addresses: addrs.iter().copied().map(IpAddress::from).collect(),
                client_context,
            },
            RequestKind::Range { range, count } => IpReserveSpec {
                reserve_type: ReserveType::IpAddressRange,
                count: Some(*count),
                start_ip_address: Some(IpAddress::from(range.from())),
                ip_addresses: Vec::new(),
                client_context,
            },
            RequestKind::ReleaseByContext(_) => {
                return Err(ValidationError::Unsupported(
                    "release-by-context cannot be used to reserve addresses".to_string(),
                ));
            }
        };
        Ok(spec)
    }

    /// Body for `unreserve-ips`
    pub fn to_unreserve_spec(&self) -> Result<IpUnreserveSpec, ValidationError> {
        let spec = match &self.kind {
            RequestKind::List(addrs) => IpUnreserveSpec {
                unreserve_type: UnreserveType::IpAddressList,
                count: None,
                start_ip_address: None,
                ip_addresses: addrs.iter().copied().map(IpAddress::from).collect(),
                client_context: None,
            },
            RequestKind::Range { range, count } => IpUnreserveSpec {
                unreserve_type: UnreserveType::IpAddressRange,
                count: Some(*count),
                start_ip_address: Some(IpAddress::from(range.from())),
                ip_addresses: Vec::new(),
                client_context: None,
            },
            RequestKind::ReleaseByContext(context) => IpUnreserveSpec {
                unreserve_type: UnreserveType::Context,
                count: None,
                start_ip_address: None,
                ip_addresses: Vec::new(),
                client_context: Some(context.clone()),
            },
            RequestKind::Count(_) => {
                return Err(ValidationError::Unsupported(
                    "a bare count cannot be released; use a list, range or client context"
                        .to_string(),
                ));
            }
        };
        Ok(spec)
    }
}
