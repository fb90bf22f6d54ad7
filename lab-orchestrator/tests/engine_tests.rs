//! End-to-end engine tests against the in-memory mock gateway.

use std::collections::BTreeSet;
use std::sync::Arc;

use lab_config::Tunables;
use lab_core::LabError;
use lab_orchestrator::{GroupId, InstantiateRequest, LabEngine};
use lab_platform::mock::MockGateway;
use lab_platform::{PlatformGateway, PowerState};

fn tunables() -> Tunables {
    Tunables {
        gate_wait_secs: 5,
        poll_attempts: 5,
        poll_initial_ms: 1,
        poll_max_ms: 4,
    }
}

fn engine(gateway: &Arc<MockGateway>) -> LabEngine {
    LabEngine::new(Arc::clone(gateway) as Arc<dyn PlatformGateway>, &tunables())
}

fn web_request() -> InstantiateRequest {
    InstantiateRequest {
        lab_group: "web".to_string(),
        vlan_zone: "vlanzone1".to_string(),
        vlan_tag: 100,
        instance: None,
    }
}

/// Two templates tagged for `web` on one node.
fn web_cluster() -> Arc<MockGateway> {
    let gateway = Arc::new(MockGateway::new());
    gateway.add_node("pve1");
    gateway.add_template(
        "pve1",
        100,
        "tmplA",
        "LabGroups:[web]",
        "virtio=BC:24:11:00:00:01,bridge=vmbr0",
    );
    gateway.add_template(
        "pve1",
        101,
        "tmplB",
        "LabGroups:[web,db]",
        "virtio=BC:24:11:00:00:02,bridge=vmbr0",
    );
    gateway
}

/// An already-instantiated `web_cloned1` with the given member ids.
fn web_lab(members: &[u32]) -> Arc<MockGateway> {
    let gateway = Arc::new(MockGateway::new());
    gateway.add_node("pve1");
    gateway.add_vnet("vnet1", "vlanzone1", 100);
    for (i, vmid) in members.iter().enumerate() {
        gateway.add_vm(
            "pve1",
            *vmid,
            &format!("web-tmpl-{vmid}"),
            "Lab: web | Instance: 1",
            &format!("virtio=BC:24:11:00:01:{i:02},bridge=vnet1"),
            PowerState::Stopped,
        );
    }
    gateway
}

#[tokio::test]
async fn instantiate_creates_vnet_and_bound_clones() {
    let gateway = web_cluster();
    let report = engine(&gateway)
        .instantiate(&web_request())
        .await
        .expect("instantiate");

    assert_eq!(report.group, GroupId::new("web", 1));
    assert_eq!(report.vnet, "vnet1");
    assert_eq!(gateway.vnet_names(), vec!["vnet1"]);

    let names: Vec<String> = report.created.iter().map(|vm| vm.name.clone()).collect();
    assert_eq!(names, vec!["web-tmplA-1000", "web-tmplB-1001"]);

    // Model and MAC survive the rebind; only the bridge changes.
    assert_eq!(
        gateway.vm_net0(1000).as_deref(),
        Some("virtio=BC:24:11:00:00:01,bridge=vnet1")
    );
    assert_eq!(
        gateway.vm_net0(1001).as_deref(),
        Some("virtio=BC:24:11:00:00:02,bridge=vnet1")
    );

    // Each clone carries the instance marker.
    assert_eq!(
        gateway.vm_description(1000).as_deref(),
        Some("Lab: web | Instance: 1")
    );
}

#[tokio::test]
async fn instantiate_survives_slow_clone_materialization() {
    let gateway = web_cluster();
    gateway.set_clone_delay(3);
    let report = engine(&gateway)
        .instantiate(&web_request())
        .await
        .expect("instantiate with slow clones");
    assert_eq!(report.created.len(), 2);
}

#[tokio::test]
async fn instantiate_skips_ids_already_in_use() {
    let gateway = web_cluster();
    gateway.add_vm(
        "pve1",
        1000,
        "squatter",
        "",
        "virtio=BC:24:11:00:02:00,bridge=vmbr0",
        PowerState::Running,
    );
    let report = engine(&gateway)
        .instantiate(&web_request())
        .await
        .expect("instantiate");
    let vmids: Vec<u32> = report.created.iter().map(|vm| vm.vmid).collect();
    assert_eq!(vmids, vec![1001, 1002]);
}

#[tokio::test]
async fn explicit_instance_number_sets_the_id_block() {
    let gateway = web_cluster();
    let mut request = web_request();
    request.instance = Some(7);
    let report = engine(&gateway)
        .instantiate(&request)
        .await
        .expect("instantiate");
    assert_eq!(report.group, GroupId::new("web", 7));
    let vmids: Vec<u32> = report.created.iter().map(|vm| vm.vmid).collect();
    assert_eq!(vmids, vec![7000, 7001]);
}

#[tokio::test]
async fn second_instantiate_gets_fresh_instance_and_vnet() {
    let gateway = web_cluster();
    let engine = engine(&gateway);
    let first = engine.instantiate(&web_request()).await.expect("first");
    let second = engine.instantiate(&web_request()).await.expect("second");

    assert_eq!(first.group, GroupId::new("web", 1));
    assert_eq!(second.group, GroupId::new("web", 2));
    assert_eq!(first.vnet, "vnet1");
    assert_eq!(second.vnet, "vnet2");

    let first_ids: BTreeSet<u32> = first.created.iter().map(|vm| vm.vmid).collect();
    let second_ids: BTreeSet<u32> = second.created.iter().map(|vm| vm.vmid).collect();
    assert!(first_ids.is_disjoint(&second_ids));
}

#[tokio::test]
async fn concurrent_instantiates_stay_disjoint() {
    let gateway = web_cluster();
    let engine = engine(&gateway);

    let request_a = web_request();
    let request_b = web_request();
    let (a, b) = tokio::join!(
        engine.instantiate(&request_a),
        engine.instantiate(&request_b)
    );
    let a = a.expect("first concurrent instantiate");
    let b = b.expect("second concurrent instantiate");

    assert_ne!(a.vnet, b.vnet);
    let a_ids: BTreeSet<u32> = a.created.iter().map(|vm| vm.vmid).collect();
    let b_ids: BTreeSet<u32> = b.created.iter().map(|vm| vm.vmid).collect();
    assert!(a_ids.is_disjoint(&b_ids));
}

#[tokio::test]
async fn instantiate_without_tagged_templates_is_not_found() {
    let gateway = Arc::new(MockGateway::new());
    gateway.add_node("pve1");
    gateway.add_template(
        "pve1",
        100,
        "tmplA",
        "LabGroups:[db]",
        "virtio=BC:24:11:00:00:01,bridge=vmbr0",
    );
    let result = engine(&gateway).instantiate(&web_request()).await;
    assert!(matches!(result, Err(LabError::NotFound(_))));
}

#[tokio::test]
async fn instantiate_with_no_nodes_is_fatal() {
    let gateway = Arc::new(MockGateway::new());
    let result = engine(&gateway).instantiate(&web_request()).await;
    assert!(matches!(result, Err(LabError::NoNodes)));
}

#[tokio::test]
async fn tag_template_rewrites_group_list() {
    let gateway = web_cluster();
    let engine = engine(&gateway);
    let groups = vec!["red".to_string(), "blue".to_string()];

    engine.tag_template(100, &groups).await.expect("tag");
    assert_eq!(
        gateway.vm_description(100).as_deref(),
        Some("LabGroups:[red,blue]")
    );

    // Re-tagging with the same list changes nothing.
    engine.tag_template(100, &groups).await.expect("re-tag");
    assert_eq!(
        gateway.vm_description(100).as_deref(),
        Some("LabGroups:[red,blue]")
    );

    let missing = engine.tag_template(999, &groups).await;
    assert!(matches!(missing, Err(LabError::NotFound(_))));
}

#[tokio::test]
async fn reconcile_applies_set_difference() {
    let gateway = web_lab(&[1000, 1001, 1002]);
    gateway.add_vm(
        "pve1",
        1003,
        "drifter",
        "spare VM",
        "virtio=BC:24:11:00:03:00,bridge=vmbr0",
        PowerState::Stopped,
    );
    let engine = engine(&gateway);
    let group = GroupId::new("web", 1);
    let requested: BTreeSet<u32> = [1001, 1002, 1003].into_iter().collect();

    let report = engine.reconcile(&group, &requested).await.expect("reconcile");
    assert_eq!(report.added, vec![1003]);
    assert_eq!(report.removed, vec![1000]);
    assert!(report.failures.is_empty());

    // The added VM joined the group network and carries the qualified marker.
    assert_eq!(
        gateway.vm_net0(1003).as_deref(),
        Some("virtio=BC:24:11:00:03:00,bridge=vnet1")
    );
    let added_desc = gateway.vm_description(1003).expect("description");
    assert!(added_desc.contains("Lab: web added | Instance: 1"));
    assert!(added_desc.contains("spare VM"));

    // The removed VM lost only its marker; it still exists and keeps its NIC.
    assert!(gateway.has_vm(1000));
    let removed_desc = gateway.vm_description(1000).expect("description");
    assert!(!removed_desc.contains("Instance:"));
    assert!(gateway.vm_net0(1000).expect("net0").contains("bridge=vnet1"));

    // Re-running with the same request converges to an empty diff.
    let rerun = engine.reconcile(&group, &requested).await.expect("re-run");
    assert!(rerun.converged());
}

#[tokio::test]
async fn reconcile_reports_unknown_ids_without_aborting() {
    let gateway = web_lab(&[1000]);
    let engine = engine(&gateway);
    let group = GroupId::new("web", 1);
    let requested: BTreeSet<u32> = [1000, 4242].into_iter().collect();

    let report = engine.reconcile(&group, &requested).await.expect("reconcile");
    assert!(report.added.is_empty());
    assert!(report.removed.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].vmid, 4242);
}

#[tokio::test]
async fn reconcile_without_members_or_vnet_fails() {
    let gateway = Arc::new(MockGateway::new());
    gateway.add_node("pve1");
    let engine = engine(&gateway);
    let group = GroupId::new("web", 1);
    let requested: BTreeSet<u32> = [1000].into_iter().collect();

    let no_members = engine.reconcile(&group, &requested).await;
    assert!(matches!(no_members, Err(LabError::NotFound(_))));

    // A member with no bridge binding leaves the group unresolvable.
    gateway.add_vm(
        "pve1",
        1000,
        "web-a",
        "Lab: web | Instance: 1",
        "",
        PowerState::Stopped,
    );
    let no_vnet = engine.reconcile(&group, &requested).await;
    assert!(matches!(no_vnet, Err(LabError::NotFound(_))));
}

#[tokio::test]
async fn set_power_commands_only_divergent_members() {
    let gateway = web_lab(&[1000, 1001]);
    let engine = engine(&gateway);
    let group = GroupId::new("web", 1);

    let started = engine
        .set_power(&group, PowerState::Running)
        .await
        .expect("start");
    assert_eq!(started.commanded, vec![1000, 1001]);
    assert_eq!(gateway.vm_power(1000), Some(PowerState::Running));

    // 1000 already runs; only 1001 needs a command after we stop it.
    gateway
        .stop_vm("pve1", 1001)
        .await
        .expect("stop member directly");
    let restarted = engine
        .set_power(&group, PowerState::Running)
        .await
        .expect("start again");
    assert_eq!(restarted.commanded, vec![1001]);
}

#[tokio::test]
async fn teardown_stops_deletes_and_removes_vnet() {
    let gateway = web_lab(&[1000, 1001]);
    gateway
        .start_vm("pve1", 1000)
        .await
        .expect("start member directly");
    let engine = engine(&gateway);
    let group = GroupId::new("web", 1);

    let report = engine.teardown(&group).await.expect("teardown");
    assert_eq!(report.deleted, vec![1000, 1001]);
    assert!(report.failures.is_empty());
    assert!(report.vnet_deleted);
    assert!(!gateway.has_vm(1000));
    assert!(!gateway.has_vm(1001));
    assert!(gateway.vnet_names().is_empty());
}

#[tokio::test]
async fn stuck_member_blocks_vnet_but_not_siblings() {
    let gateway = web_lab(&[1000, 1001]);
    gateway
        .start_vm("pve1", 1000)
        .await
        .expect("start member directly");
    gateway.set_stuck(1000);
    let engine = engine(&gateway);
    let group = GroupId::new("web", 1);

    let report = engine.teardown(&group).await.expect("teardown");
    assert_eq!(report.deleted, vec![1001]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].vmid, 1000);
    assert!(!report.vnet_deleted);

    // The stuck VM and the shared vnet both survive.
    assert!(gateway.has_vm(1000));
    assert_eq!(gateway.vnet_names(), vec!["vnet1"]);
}

#[tokio::test]
async fn full_lab_lifecycle() {
    let gateway = web_cluster();
    let engine = engine(&gateway);

    let created = engine
        .instantiate(&web_request())
        .await
        .expect("instantiate");
    let group = created.group.clone();
    assert_eq!(group.to_string(), "web_cloned1");

    engine
        .set_power(&group, PowerState::Running)
        .await
        .expect("start lab");
    for vm in &created.created {
        assert_eq!(gateway.vm_power(vm.vmid), Some(PowerState::Running));
    }

    let report = engine.teardown(&group).await.expect("teardown");
    assert_eq!(report.deleted.len(), 2);
    assert!(report.vnet_deleted);
    assert!(gateway.vnet_names().is_empty());

    // Templates are untouched by the teardown.
    assert!(gateway.has_vm(100));
    assert!(gateway.has_vm(101));
}
