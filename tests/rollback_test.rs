//! Acquisition rollback across every ordering of a resource set.

mod common;

use std::time::Duration;

use common::*;
use service_orchestrator::resources::{ResourceKind, ResourceRegistry, ResourceSpec};
use tokio::time::Instant;

fn permutations(items: &[ResourceSpec]) -> Vec<Vec<ResourceSpec>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

fn resource_set() -> Vec<ResourceSpec> {
    vec![
        spec("mysql", ResourceKind::Relational),
        spec("redis", ResourceKind::Cache),
        spec("mongo", ResourceKind::Document),
        spec("kafka", ResourceKind::QueueProducer),
    ]
}

#[tokio::test]
async fn failure_at_k_closes_everything_before_k() {
    let orderings = permutations(&resource_set());
    assert_eq!(orderings.len(), 24);

    for order in &orderings {
        for k in 0..order.len() {
            for refuse_connect in [true, false] {
                let failing = &order[k].name;
                let connector = if refuse_connect {
                    MockConnector::new().refuse(failing)
                } else {
                    MockConnector::new().unhealthy(failing)
                };

                let err = ResourceRegistry::acquire_all(
                    connector.as_connector(),
                    order,
                    Duration::from_secs(1),
                )
                .await
                .unwrap_err();
                assert_eq!(&err.source.name, failing);
                assert!(err.rollback.is_none());

                // Nothing after k was touched.
                let attempted: Vec<_> = order[..=k].iter().map(|s| s.name.clone()).collect();
                assert_eq!(connector.connects(), attempted);

                // Earlier resources close newest-first; an unhealthy k closes before them.
                let mut expected: Vec<_> = order[..k].iter().rev().map(|s| s.name.clone()).collect();
                if !refuse_connect {
                    expected.insert(0, failing.clone());
                }
                assert_eq!(connector.closes(), expected, "order {order:?}, k {k}");
            }
        }
    }
}

#[tokio::test]
async fn successful_acquisition_closes_once_in_reverse() {
    let connector = MockConnector::new();
    let registry =
        ResourceRegistry::acquire_all(connector.as_connector(), &resource_set(), Duration::from_secs(1))
            .await
            .unwrap();
    assert_eq!(registry.pending_shutdowns(), 4);

    let deadline = Instant::now() + Duration::from_secs(1);
    registry.close_all(deadline).await.unwrap();
    registry.close_all(deadline).await.unwrap();

    assert_eq!(connector.closes(), vec!["kafka", "mongo", "redis", "mysql"]);
    assert!(registry.handles().iter().all(|h| !h.is_open()));
}
