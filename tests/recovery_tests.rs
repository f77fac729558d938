//! Recovery-Method Chooser boundary scenarios (spec.md §4.3, §8 S3/S5):
//! errant transactions always win, and an all-IPv6 donor set leaves no
//! clone fallback.

mod common;

use common::{MockConnection, MockTransport, Scripted};
use mysql_cluster_admin::error::AdminError;
use mysql_cluster_admin::gr_probe::{GrProbe, SqlGrProbe};
use mysql_cluster_admin::recovery::chooser::{choose_recovery_method, ChooserInput, Donor};
use mysql_cluster_admin::session::InstanceSession;
use mysql_cluster_admin::types::{Endpoint, RecoveryMethodPreference};
use std::sync::Arc;

async fn session_with_gtid(endpoint: Endpoint, gtid_executed: &str, gtid_purged: &str) -> InstanceSession {
    let conn = MockConnection::new()
        .on(
            "SELECT @@GLOBAL.gtid_executed AS v",
            Scripted::Rows(vec![row("v", gtid_executed)]),
        )
        .on("SELECT @@GLOBAL.gtid_purged AS v", Scripted::Rows(vec![row("v", gtid_purged)]));
    let transport = Arc::new(MockTransport::new().with_connection(&endpoint, conn));
    InstanceSession::builder(endpoint, transport).build().await.unwrap()
}

fn row(col: &str, value: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut m = serde_json::Map::new();
    m.insert(col.to_string(), serde_json::Value::String(value.to_string()));
    m
}

#[tokio::test]
async fn all_ipv6_donors_leave_no_clone_fallback() {
    let joiner_endpoint = Endpoint::new("10.0.0.5", 3306);
    let joiner = session_with_gtid(joiner_endpoint, "", "").await;

    let donor_endpoint_a = Endpoint::new("2001:db8::1", 3306);
    let donor_endpoint_b = Endpoint::new("2001:db8::2", 3306);
    let donor_a = session_with_gtid(donor_endpoint_a.clone(), "aaaa:1-5", "").await;
    let donor_b = session_with_gtid(donor_endpoint_b.clone(), "aaaa:1-5", "").await;

    let probe = SqlGrProbe;
    let donors = vec![
        Donor { endpoint: donor_endpoint_a, session: &donor_a },
        Donor { endpoint: donor_endpoint_b, session: &donor_b },
    ];
    let input = ChooserInput {
        preference: RecoveryMethodPreference::Auto,
        disable_clone: false,
        gtid_set_complete: false,
        joiner_supports_clone: true,
        interactive: false,
    };

    let err = choose_recovery_method(&probe, &joiner, &donors, input).await.unwrap_err();
    match err {
        AdminError::CloneNoDonors { rejected_donors } => assert_eq!(rejected_donors.len(), 2),
        other => panic!("expected CloneNoDonors, got {other:?}"),
    }
}

#[tokio::test]
async fn identical_gtid_set_recovers_incrementally_without_clone() {
    let joiner_endpoint = Endpoint::new("10.0.0.6", 3306);
    let joiner = session_with_gtid(joiner_endpoint, "aaaa:1-5", "").await;

    let donor_endpoint = Endpoint::new("10.0.0.1", 3306);
    let donor = session_with_gtid(donor_endpoint.clone(), "aaaa:1-5", "").await;

    let probe = SqlGrProbe;
    let donors = vec![Donor { endpoint: donor_endpoint, session: &donor }];
    let input = ChooserInput {
        preference: RecoveryMethodPreference::Auto,
        disable_clone: false,
        gtid_set_complete: false,
        joiner_supports_clone: true,
        interactive: false,
    };

    let method = choose_recovery_method(&probe, &joiner, &donors, input).await.unwrap();
    assert_eq!(method, mysql_cluster_admin::types::RecoveryMethod::Incremental);
}
