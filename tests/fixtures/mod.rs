//! Test fixtures for vrp-bridge.
//!
//! Provides:
//! - Gauteng locations with asymmetric coordinates
//! - Builders for vehicles, jobs and shipments
//! - Canned solver responses
//! - An in-memory repository and a scripted solver transport

#![allow(dead_code)]

pub mod gauteng_locations;
pub mod memory;
pub mod responses;

use vrp_bridge::model::{Job, Shipment, ShipmentLeg, Skill, TimeWindow, Vehicle};

pub use gauteng_locations::*;

/// 2024-01-01T00:00:00Z in milliseconds.
pub const DAY_START_MS: i64 = 1_704_067_200_000;

pub fn hours_ms(h: i64) -> i64 {
    h * 3_600_000
}

// ============================================================================
// Builders
// ============================================================================

/// Builder for test vehicles with sensible defaults.
#[derive(Clone, Debug)]
pub struct TestVehicle(Vehicle);

impl TestVehicle {
    pub fn new(id: &str) -> Self {
        Self(Vehicle {
            id: id.to_string(),
            start_longitude: Some(JOHANNESBURG_CBD.lon),
            start_latitude: Some(JOHANNESBURG_CBD.lat),
            capacity: vec![1000, 15, 50],
            ..Default::default()
        })
    }

    pub fn start(mut self, location: Location) -> Self {
        self.0.start_longitude = Some(location.lon);
        self.0.start_latitude = Some(location.lat);
        self
    }

    pub fn end(mut self, location: Location) -> Self {
        self.0.end_longitude = Some(location.lon);
        self.0.end_latitude = Some(location.lat);
        self
    }

    pub fn no_start(mut self) -> Self {
        self.0.start_longitude = None;
        self.0.start_latitude = None;
        self
    }

    pub fn capacity(mut self, capacity: &[i64]) -> Self {
        self.0.capacity = capacity.to_vec();
        self
    }

    pub fn window(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.0.time_window_start_ms = Some(start_ms);
        self.0.time_window_end_ms = Some(end_ms);
        self
    }

    pub fn costs(mut self, fixed: f64, per_hour: f64, per_km: f64) -> Self {
        self.0.cost_fixed = Some(fixed);
        self.0.cost_per_hour = Some(per_hour);
        self.0.cost_per_km = Some(per_km);
        self
    }

    pub fn skill(mut self, skill_id: &str) -> Self {
        self.0.skills.push(skill_id.to_string());
        self
    }

    pub fn with(mut self, edit: impl FnOnce(&mut Vehicle)) -> Self {
        edit(&mut self.0);
        self
    }

    pub fn build(self) -> Vehicle {
        self.0
    }
}

/// Builder for test jobs with sensible defaults.
#[derive(Clone, Debug)]
pub struct TestJob(Job);

impl TestJob {
    pub fn new(id: &str) -> Self {
        let site = CUSTOMERS[0];
        Self(Job {
            id: id.to_string(),
            longitude: Some(site.lon),
            latitude: Some(site.lat),
            service: 300,
            delivery: Some(vec![25, 2, 5]),
            priority: 0,
            ..Default::default()
        })
    }

    pub fn at(mut self, location: Location) -> Self {
        self.0.longitude = Some(location.lon);
        self.0.latitude = Some(location.lat);
        self
    }

    pub fn delivery(mut self, amount: &[i64]) -> Self {
        self.0.delivery = Some(amount.to_vec());
        self
    }

    pub fn pickup(mut self, amount: &[i64]) -> Self {
        self.0.pickup = Some(amount.to_vec());
        self
    }

    pub fn no_demand(mut self) -> Self {
        self.0.delivery = None;
        self.0.pickup = None;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.0.priority = priority;
        self
    }

    pub fn window(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.0.time_windows.push(TimeWindow::new(start_ms, end_ms));
        self
    }

    pub fn requires(mut self, skill_id: &str) -> Self {
        self.0.skills.push(skill_id.to_string());
        self
    }

    pub fn with(mut self, edit: impl FnOnce(&mut Job)) -> Self {
        edit(&mut self.0);
        self
    }

    pub fn build(self) -> Job {
        self.0
    }
}

/// Builder for test shipments with sensible defaults.
#[derive(Clone, Debug)]
pub struct TestShipment(Shipment);

impl TestShipment {
    pub fn new(id: &str) -> Self {
        Self(Shipment {
            id: id.to_string(),
            pickup: leg(DEPOTS[1]),
            delivery: leg(CUSTOMERS[2]),
            amount: vec![100, 1, 2],
            priority: 10,
            ..Default::default()
        })
    }

    pub fn from_to(mut self, pickup: Location, delivery: Location) -> Self {
        self.0.pickup = leg(pickup);
        self.0.delivery = leg(delivery);
        self
    }

    pub fn pickup_window(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.0.pickup.time_windows.push(TimeWindow::new(start_ms, end_ms));
        self
    }

    pub fn delivery_window(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.0.delivery.time_windows.push(TimeWindow::new(start_ms, end_ms));
        self
    }

    pub fn requires(mut self, skill_id: &str) -> Self {
        self.0.skills.push(skill_id.to_string());
        self
    }

    pub fn with(mut self, edit: impl FnOnce(&mut Shipment)) -> Self {
        edit(&mut self.0);
        self
    }

    pub fn build(self) -> Shipment {
        self.0
    }
}

fn leg(location: Location) -> ShipmentLeg {
    ShipmentLeg {
        longitude: Some(location.lon),
        latitude: Some(location.lat),
        setup: None,
        service: 600,
        time_windows: Vec::new(),
    }
}

pub fn skills(ids: &[&str]) -> Vec<Skill> {
    ids.iter().map(|id| Skill::new(*id, id.to_uppercase())).collect()
}

/// A small dataset: two vehicles, three jobs, one shipment.
pub fn small_dataset() -> (Vec<Vehicle>, Vec<vrp_bridge::model::Job>, Vec<Shipment>, Vec<Skill>) {
    let vehicles = vec![
        TestVehicle::new("veh_a").skill("sk_fridge").build(),
        TestVehicle::new("veh_b").start(DEPOTS[2]).build(),
    ];
    let jobs = vec![
        TestJob::new("job_1").at(CUSTOMERS[0]).build(),
        TestJob::new("job_2").at(CUSTOMERS[1]).requires("sk_fridge").build(),
        TestJob::new("job_3").at(CUSTOMERS[3]).build(),
    ];
    let shipments = vec![TestShipment::new("shp_1").build()];
    (vehicles, jobs, shipments, skills(&["sk_fridge"]))
}
