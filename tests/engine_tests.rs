//! Join/Reboot Engine boundary scenarios (spec.md §4.5, §8 S2/S4): a
//! target already carrying Group Replication state refuses `addInstance`,
//! and a reboot refuses outright if any candidate is still ONLINE.

mod common;

use common::{MockConnection, MockTransport, ScriptedProbe};
use mysql_cluster_admin::context::OperationContext;
use mysql_cluster_admin::engine::join::{join_instance, JoinContext};
use mysql_cluster_admin::engine::reboot::{reboot_cluster_from_complete_outage, Candidate, RebootOptions};
use mysql_cluster_admin::engine::JoinOptions;
use mysql_cluster_admin::error::AdminError;
use mysql_cluster_admin::metadata::model::{Cluster, Member};
use mysql_cluster_admin::metadata::MetadataStore;
use mysql_cluster_admin::session::InstanceSession;
use mysql_cluster_admin::types::{CommunicationStack, Endpoint, MemberState, TopologyMode};
use std::sync::Arc;

async fn bare_session(endpoint: Endpoint) -> InstanceSession {
    let transport = Arc::new(MockTransport::new().with_connection(&endpoint, MockConnection::new()));
    InstanceSession::builder(endpoint, transport).build().await.unwrap()
}

fn sample_cluster(cluster_set_id: Option<String>) -> Cluster {
    Cluster {
        id: "cluster1".into(),
        name: "prod".into(),
        topology_mode: TopologyMode::SinglePrimary,
        communication_stack: CommunicationStack::Mysql,
        group_name: "group1".into(),
        view_change_uuid: "uuid1".into(),
        gtid_set_complete: true,
        disable_clone: false,
        tags: Default::default(),
        cluster_set_id,
        cluster_set_role: mysql_cluster_admin::metadata::model::ClusterSetRole::None,
        remove_pending: false,
        fenced: false,
        created_at: String::new(),
        last_changed_time: String::new(),
        extra: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn add_instance_refuses_a_target_already_reporting_gr_state() {
    let ctx = OperationContext::builder().build();
    let metadata = MetadataStore::new(Box::new(common::MockMetadataBackend::default()));

    let primary_endpoint = Endpoint::new("10.0.0.1", 3306);
    let joiner_endpoint = Endpoint::new("10.0.0.2", 3306);
    let primary = bare_session(primary_endpoint.clone()).await;
    let joiner = bare_session(joiner_endpoint.clone()).await;

    let probe = ScriptedProbe::new().with_state(&joiner_endpoint, MemberState::Online);

    let join_ctx = JoinContext {
        cluster_id: "cluster1".into(),
        group_name: "group1".into(),
        view_change_uuid: "uuid1".into(),
        topology_mode: TopologyMode::SinglePrimary,
        communication_stack: CommunicationStack::Mysql,
        primary: &primary,
        peers: vec![&primary],
        peer_server_ids: vec![1],
        existing_member_count: 1,
        disable_clone: false,
        gtid_set_complete: false,
    };
    let options = JoinOptions::builder().build();

    let err = join_instance(&ctx, &metadata, &probe, &join_ctx, &joiner, true, 101, "%", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::BadArgInstanceAlreadyManaged(_)));
}

#[tokio::test]
async fn reboot_refuses_if_any_candidate_is_still_online() {
    let ctx = OperationContext::builder().build();
    let metadata = MetadataStore::new(Box::new(common::MockMetadataBackend::default()));
    let cluster = sample_cluster(None);

    let online_endpoint = Endpoint::new("10.0.0.3", 3306);
    let online_session = bare_session(online_endpoint.clone()).await;
    let probe = ScriptedProbe::new().with_state(&online_endpoint, MemberState::Online);

    let candidates = vec![Candidate {
        member: Member {
            uuid: "m1".into(),
            cluster_id: "cluster1".into(),
            endpoint: online_endpoint,
            label: "m1".into(),
            server_id: 1,
            local_address: "10.0.0.3:3306".into(),
            recovery_account: None,
            cert_subject: None,
            join_timestamp: String::new(),
            extra: serde_json::Value::Null,
        },
        session: Some(&online_session),
    }];

    let options = RebootOptions::builder().build();
    let err = reboot_cluster_from_complete_outage(&ctx, &metadata, &probe, &cluster, candidates, "%", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::ClusterNotDown));
}
