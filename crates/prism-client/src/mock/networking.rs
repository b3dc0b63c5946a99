//! Subnet and reservation operations for MockPrismClient

use super::tasks::{Effect, ScriptedOutcome, create_task, next_script};
use super::{MockPrismClient, Reservation, lock};
use crate::common::query::parse_eq_filter;
use crate::error::PrismError;
use crate::models::*;
use std::net::IpAddr;
use tracing::debug;

pub(crate) fn list_subnets(
    mock: &MockPrismClient,
    filter: Option<&str>,
) -> Result<Vec<Subnet>, PrismError> {
    let clauses = match filter {
        Some(f) => parse_eq_filter(f)
            .ok_or_else(|| PrismError::InvalidRequest(format!("unsupported filter: {}", f)))?,
        None => Vec::new(),
    };

    let mut subnets: Vec<Subnet> = lock(&mock.subnets)
        .values()
        .filter(|s| {
            clauses.iter().all(|(field, value)| match field.as_str() {
                "name" => &s.name == value,
                "extId" => &s.ext_id == value,
                "clusterReference" => s.cluster_reference.as_deref() == Some(value.as_str()),
                _ => false,
            })
        })
        .cloned()
        .collect();
    subnets.sort_by(|a, b| a.ext_id.cmp(&b.ext_id));
    Ok(subnets)
}

pub(crate) fn get_subnet_by_id(mock: &MockPrismClient, ext_id: &str) -> Result<Subnet, PrismError> {
    lock(&mock.subnets)
        .get(ext_id)
        .cloned()
        .ok_or_else(|| PrismError::NotFound(format!("Subnet {} not found", ext_id)))
}

/// Addresses `start, start+1, ...` for `count` steps; `None` on overflow or bad input
pub(crate) fn range_addresses(start: Option<&IpAddress>, count: Option<i64>) -> Option<Vec<IpAddr>> {
    let start = start?.to_ip_addr()?;
    let count = u64::try_from(count?).ok()?;
    (0..count).map(|offset| nth_address(start, offset)).collect()
}

fn nth_address(start: IpAddr, offset: u64) -> Option<IpAddr> {
    match start {
        IpAddr::V4(a) => u32::from(a)
            .checked_add(u32::try_from(offset).ok()?)
            .map(|v| IpAddr::V4(v.into())),
        IpAddr::V6(a) => u128::from(a)
            .checked_add(u128::from(offset))
            .map(|v| IpAddr::V6(v.into())),
    }
}

pub(crate) fn reserve_ips(
    mock: &MockPrismClient,
    ext_id: &str,
    spec: &IpReserveSpec,
    request_id: &str,
) -> Result<TaskReference, PrismError> {
    get_subnet_by_id(mock, ext_id)?;

    let mut request_ids = lock(&mock.request_ids);
    if let Some(task_id) = request_ids.get(request_id) {
        debug!("Request id {} already submitted, returning task {}", request_id, task_id);
        return Ok(TaskReference {
            ext_id: task_id.clone(),
        });
    }

    let wanted: Option<Vec<IpAddr>> = match spec.reserve_type {
        ReserveType::IpAddressCount => match spec.count {
            Some(n) if n >= 1 => None,
            _ => {
                return Err(PrismError::InvalidRequest(
                    "count must be at least 1".to_string(),
                ));
            }
        },
        ReserveType::IpAddressRange => Some(
            range_addresses(spec.start_ip_address.as_ref(), spec.count).ok_or_else(|| {
                PrismError::InvalidRequest("range needs a start address and a count".to_string())
            })?,
        ),
        ReserveType::IpAddressList => {
            if spec.ip_addresses.is_empty() {
                return Err(PrismError::InvalidRequest(
                    "ipAddresses must not be empty".to_string(),
                ));
            }
            Some(
                spec.ip_addresses
                    .iter()
                    .map(IpAddress::to_ip_addr)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| PrismError::InvalidRequest("malformed address".to_string()))?,
            )
        }
    };

    let mut script = next_script(mock);
    let mut effect = None;
    if script.outcome == ScriptedOutcome::Succeed {
        let mut free = lock(&mock.free_ips);
        let pool = free.entry(ext_id.to_string()).or_default();
        let chosen = match wanted {
            None => {
                let n = usize::try_from(spec.count.unwrap_or(1)).unwrap_or(usize::MAX);
                (pool.len() >= n).then(|| pool[..n].to_vec())
            }
            Some(ips) => ips.iter().all(|ip| pool.contains(ip)).then_some(ips),
        };

        match chosen {
            Some(ips) => {
                pool.retain(|ip| !ips.contains(ip));
                lock(&mock.reserved)
                    .entry(ext_id.to_string())
                    .or_default()
                    .extend(ips.iter().map(|ip| Reservation {
                        ip: *ip,
                        client_context: spec.client_context.clone(),
                    }));
                effect = Some(Effect::Reserved(ips));
            }
            None => {
                script.outcome =
                    ScriptedOutcome::Fail("requested addresses are not available".to_string());
            }
        }
    }

    let reference = create_task(mock, "ReserveIps", script, effect);
    request_ids.insert(request_id.to_string(), reference.ext_id.clone());
    Ok(reference)
}

pub(crate) fn unreserve_ips(
    mock: &MockPrismClient,
    ext_id: &str,
    spec: &IpUnreserveSpec,
    request_id: &str,
) -> Result<TaskReference, PrismError> {
    get_subnet_by_id(mock, ext_id)?;

    let mut request_ids = lock(&mock.request_ids);
    if let Some(task_id) = request_ids.get(request_id) {
        debug!("Request id {} already submitted, returning task {}", request_id, task_id);
        return Ok(TaskReference {
            ext_id: task_id.clone(),
        });
    }

    if spec.unreserve_type == UnreserveType::Context && spec.client_context.is_none() {
        return Err(PrismError::InvalidRequest(
            "clientContext is required for CONTEXT unreserve".to_string(),
        ));
    }

    let script = next_script(mock);
    let effect = Effect::Unreserve {
        subnet: ext_id.to_string(),
        spec: spec.clone(),
    };
    let reference = create_task(mock, "UnreserveIps", script, Some(effect));
    request_ids.insert(request_id.to_string(), reference.ext_id.clone());
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::super::TaskScript;
    use super::super::helpers::subnet;
    use super::*;
    use crate::prism_trait::PrismClientTrait;

    const SUBNET: &str = "7b2a3c10-0000-4000-8000-000000000001";

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn mock() -> MockPrismClient {
        let mock = MockPrismClient::new("https://pc.test:9440");
        mock.add_subnet(subnet(SUBNET, "vlan-10", Some("cluster-a")));
        mock.set_available_ips(SUBNET, vec![ip("10.0.0.5"), ip("10.0.0.6"), ip("10.0.0.7")]);
        mock
    }

    fn count_spec(n: i64, ctx: &str) -> IpReserveSpec {
        IpReserveSpec {
            reserve_type: ReserveType::IpAddressCount,
            count: Some(n),
            start_ip_address: None,
            ip_addresses: Vec::new(),
            client_context: Some(ctx.to_string()),
        }
    }

    #[tokio::test]
    async fn test_repeated_request_id_returns_same_task() {
        let mock = mock();
        let first = mock
            .reserve_ips_by_subnet_id(SUBNET, &count_spec(1, "uid-1"), "req-1")
            .await
            .unwrap();
        let second = mock
            .reserve_ips_by_subnet_id(SUBNET, &count_spec(1, "uid-1"), "req-1")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.tasks_created(), 1);
        assert_eq!(mock.reservations(SUBNET).len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_task_progresses_to_success() {
        let mock = mock();
        mock.push_task_script(TaskScript::succeed_after(2));
        let task_ref = mock
            .reserve_ips_by_subnet_id(SUBNET, &count_spec(1, "uid-1"), "req-1")
            .await
            .unwrap();

        for _ in 0..2 {
            let task = mock.get_task_by_id(&task_ref.ext_id).await.unwrap();
            assert_eq!(task.status, Some(TaskStatus::Running));
        }
        let task = mock.get_task_by_id(&task_ref.ext_id).await.unwrap();
        assert_eq!(task.status, Some(TaskStatus::Succeeded));
        assert_eq!(task.completion_details.len(), 1);

        // Terminal states never revert
        let again = mock.get_task_by_id(&task_ref.ext_id).await.unwrap();
        assert_eq!(again.status, Some(TaskStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_unreserve_by_context_returns_address() {
        let mock = mock();
        let reserve = mock
            .reserve_ips_by_subnet_id(SUBNET, &count_spec(1, "uid-1"), "req-1")
            .await
            .unwrap();
        mock.get_task_by_id(&reserve.ext_id).await.unwrap();
        assert_eq!(mock.free_ips(SUBNET).len(), 2);

        let spec = IpUnreserveSpec {
            unreserve_type: UnreserveType::Context,
            count: None,
            start_ip_address: None,
            ip_addresses: Vec::new(),
            client_context: Some("uid-1".to_string()),
        };
        let release = mock
            .unreserve_ips_by_subnet_id(SUBNET, &spec, "req-2")
            .await
            .unwrap();
        mock.get_task_by_id(&release.ext_id).await.unwrap();

        assert!(mock.reservations(SUBNET).is_empty());
        assert_eq!(mock.free_ips(SUBNET).len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_subnet_fails_task() {
        let mock = mock();
        let task_ref = mock
            .reserve_ips_by_subnet_id(SUBNET, &count_spec(4, "uid-1"), "req-1")
            .await
            .unwrap();
        let task = mock.get_task_by_id(&task_ref.ext_id).await.unwrap();
        assert_eq!(task.status, Some(TaskStatus::Failed));
        assert_eq!(mock.free_ips(SUBNET).len(), 3);
    }

    #[tokio::test]
    async fn test_list_subnets_filters_by_cluster() {
        let mock = mock();
        mock.add_subnet(subnet("other", "vlan-10", Some("cluster-b")));
        let filter = "name eq 'vlan-10' and clusterReference eq 'cluster-b'";
        let found = mock.list_subnets(Some(filter)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ext_id, "other");
        assert_eq!(mock.list_subnets(Some("name eq 'vlan-10'")).await.unwrap().len(), 2);
    }
}
