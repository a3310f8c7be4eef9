//! Canned solver responses matching [`super::small_dataset`].
//!
//! Solver ids: vehicles veh_a=1, veh_b=2; jobs job_1=1, job_2=2, job_3=3;
//! shipment shp_1=1.

use serde_json::{json, Value};

pub fn step(kind: &str, id: Option<u64>, arrival: i64, distance: i64, duration: i64) -> Value {
    let mut step = json!({
        "type": kind,
        "arrival": arrival,
        "distance": distance,
        "duration": duration,
        "location": [28.0567, -26.1076],
        "load": [100, 1, 2],
    });
    if let Some(id) = id {
        step["id"] = json!(id);
    }
    step
}

pub fn envelope(routes: Vec<Value>, unassigned: Vec<Value>) -> Value {
    json!({
        "code": 0,
        "summary": {
            "cost": 5400,
            "routes": routes.len(),
            "unassigned": unassigned.len(),
            "distance": 42000,
            "duration": 5400,
            "waiting_time": 120,
            "service": 1800,
            "setup": 0,
            "computing_times": {"loading": 12, "solving": 30, "routing": 8}
        },
        "routes": routes,
        "unassigned": unassigned,
    })
}

pub fn route(vehicle: u64, steps: Vec<Value>) -> Value {
    json!({
        "vehicle": vehicle,
        "cost": 5400,
        "distance": 42000,
        "duration": 5400,
        "waiting_time": 120,
        "service": 1800,
        "setup": 0,
        "delivery": [150, 5, 12],
        "pickup": [100, 1, 2],
        "priority": 10,
        "violations": [],
        "steps": steps,
    })
}

/// veh_a serves job_2, shp_1 and job_1; job_3 is unassigned.
pub fn small_dataset_solution() -> Value {
    envelope(
        vec![route(
            1,
            vec![
                step("start", None, 1_704_067_200, 0, 0),
                step("job", Some(2), 1_704_068_100, 9000, 900),
                step("pickup", Some(1), 1_704_069_600, 21000, 2100),
                step("job", Some(1), 1_704_071_000, 30000, 3200),
                step("delivery", Some(1), 1_704_072_300, 38000, 4100),
                step("end", None, 1_704_073_500, 42000, 5400),
            ],
        )],
        vec![json!({"id": 3, "type": "job", "reason": "skills"})],
    )
}
