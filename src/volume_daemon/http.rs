use super::VolumeDaemon;
use rocket::serde::json::{json, Json, Value};
use rocket::{delete, get, post, routes, Route, State};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct CreateVolumeRequest {
    name: String,
    size_bytes: i64,
    offering: String,
    zone: String,
    vm_context_id: String,
}

#[derive(Deserialize)]
pub struct AttachRequest {
    vm_id: String,
}

#[derive(Deserialize)]
pub struct TrackSnapshotRequest {
    volume_id: String,
    snapshot_id: String,
}

#[derive(Deserialize)]
pub struct CleanupTestFailoverRequest {
    test_vm_id: String,
    volume_id: String,
    #[serde(default)]
    delete_vm: bool,
    #[serde(default)]
    force: bool,
}

#[post("/volumes", format = "json", data = "<req>")]
async fn create_volume(daemon: &State<Arc<VolumeDaemon>>, req: Json<CreateVolumeRequest>) -> Value {
    match daemon
        .create(req.name.clone(), req.size_bytes, req.offering.clone(), req.zone.clone(), req.vm_context_id.clone())
        .await
    {
        Ok(op_id) => json!({"success": true, "operation_id": op_id}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[post("/volumes/<id>/attach", format = "json", data = "<req>")]
async fn attach_volume(daemon: &State<Arc<VolumeDaemon>>, id: String, req: Json<AttachRequest>) -> Value {
    match daemon.attach(id, req.vm_id.clone(), false).await {
        Ok(op_id) => json!({"success": true, "operation_id": op_id}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[post("/volumes/<id>/attach-root", format = "json", data = "<req>")]
async fn attach_volume_root(daemon: &State<Arc<VolumeDaemon>>, id: String, req: Json<AttachRequest>) -> Value {
    match daemon.attach(id, req.vm_id.clone(), true).await {
        Ok(op_id) => json!({"success": true, "operation_id": op_id}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[post("/volumes/<id>/detach")]
async fn detach_volume(daemon: &State<Arc<VolumeDaemon>>, id: String) -> Value {
    match daemon.detach(id).await {
        Ok(op_id) => json!({"success": true, "operation_id": op_id}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[delete("/volumes/<id>")]
async fn delete_volume(daemon: &State<Arc<VolumeDaemon>>, id: String) -> Value {
    match daemon.delete(id).await {
        Ok(op_id) => json!({"success": true, "operation_id": op_id}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[get("/operations/<op_id>")]
async fn get_operation(daemon: &State<Arc<VolumeDaemon>>, op_id: String) -> Value {
    match daemon.get_operation(&op_id).await {
        Ok(op) => json!({"success": true, "operation": op}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[post("/snapshots/track", format = "json", data = "<req>")]
async fn track_snapshot(daemon: &State<Arc<VolumeDaemon>>, req: Json<TrackSnapshotRequest>) -> Value {
    match daemon.track_snapshot(&req.volume_id, &req.snapshot_id).await {
        Ok(()) => json!({"success": true}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[get("/snapshots/vm/<context_id>")]
async fn get_vm_snapshots(daemon: &State<Arc<VolumeDaemon>>, context_id: String) -> Value {
    match daemon.get_vm_snapshots(&context_id).await {
        Ok(volumes) => json!({"success": true, "volumes": volumes}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

#[post("/cleanup/test-failover", format = "json", data = "<req>")]
async fn cleanup_test_failover(daemon: &State<Arc<VolumeDaemon>>, req: Json<CleanupTestFailoverRequest>) -> Value {
    match daemon
        .cleanup_test_failover(req.test_vm_id.clone(), req.volume_id.clone(), req.delete_vm, req.force)
        .await
    {
        Ok(op_id) => json!({"success": true, "operation_id": op_id}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

pub fn routes() -> Vec<Route> {
    routes![
        create_volume,
        attach_volume,
        attach_volume_root,
        detach_volume,
        delete_volume,
        get_operation,
        track_snapshot,
        get_vm_snapshots,
        cleanup_test_failover,
    ]
}
