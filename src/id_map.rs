//! Run-scoped mapping between persistent ids and solver ids.
//!
//! The solver wants small positive integers. Every run builds its own
//! [`RunIds`]; nothing here is shared between runs.

use std::collections::{HashMap, HashSet};

use crate::error::{IdSpace, MappingError};
use crate::model::{Job, Shipment, Skill, Vehicle};
use crate::traits::Id;

/// Bijection between persistent ids and `1..=n`, in registration order.
#[derive(Debug, Clone)]
pub struct IdMap<I: Id> {
    space: IdSpace,
    forward: HashMap<I, u64>,
    reverse: Vec<I>,
}

impl<I: Id> IdMap<I> {
    /// Assign the n-th id the solver id n.
    ///
    /// Fails on the first duplicate.
    pub fn new(space: IdSpace, ids: impl IntoIterator<Item = I>) -> Result<Self, MappingError>
    where
        I: ToString,
    {
        let mut forward = HashMap::new();
        let mut reverse = Vec::new();

        for id in ids {
            let solver_id = reverse.len() as u64 + 1;
            if forward.insert(id.clone(), solver_id).is_some() {
                return Err(MappingError::DuplicateId {
                    space,
                    id: id.to_string(),
                });
            }
            reverse.push(id);
        }

        Ok(Self {
            space,
            forward,
            reverse,
        })
    }

    /// Like [`IdMap::new`], but a repeated id keeps the solver id of its
    /// first occurrence instead of failing.
    pub fn first_seen(space: IdSpace, ids: impl IntoIterator<Item = I>) -> Self {
        let mut forward = HashMap::new();
        let mut reverse = Vec::new();

        for id in ids {
            if forward.contains_key(&id) {
                continue;
            }
            forward.insert(id.clone(), reverse.len() as u64 + 1);
            reverse.push(id);
        }

        Self {
            space,
            forward,
            reverse,
        }
    }

    pub fn space(&self) -> IdSpace {
        self.space
    }

    pub fn forward(&self, id: &I) -> Result<u64, MappingError>
    where
        I: ToString,
    {
        self.forward
            .get(id)
            .copied()
            .ok_or_else(|| MappingError::UnknownPersistentId {
                space: self.space,
                id: id.to_string(),
            })
    }

    pub fn reverse(&self, solver_id: u64) -> Result<&I, MappingError> {
        solver_id
            .checked_sub(1)
            .and_then(|index| self.reverse.get(index as usize))
            .ok_or(MappingError::UnknownSolverId {
                space: self.space,
                solver_id,
            })
    }

    pub fn contains(&self, id: &I) -> bool {
        self.forward.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// `(solver_id, persistent_id)` pairs in solver id order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &I)> {
        self.reverse
            .iter()
            .enumerate()
            .map(|(index, id)| (index as u64 + 1, id))
    }
}

/// All id spaces of one run.
#[derive(Debug, Clone)]
pub struct RunIds {
    pub vehicles: IdMap<String>,
    pub jobs: IdMap<String>,
    pub shipments: IdMap<String>,
    pub skills: IdMap<String>,
}

impl RunIds {
    /// Number entities in input order.
    ///
    /// Only skills referenced by some vehicle, job or shipment get a solver
    /// id. They keep the order of `skills`.
    pub fn build(
        vehicles: &[Vehicle],
        jobs: &[Job],
        shipments: &[Shipment],
        skills: &[Skill],
    ) -> Result<Self, MappingError> {
        let referenced = referenced_skills(vehicles, jobs, shipments);

        Ok(Self {
            vehicles: IdMap::new(IdSpace::Vehicle, vehicles.iter().map(|v| v.id.clone()))?,
            jobs: IdMap::new(IdSpace::Job, jobs.iter().map(|j| j.id.clone()))?,
            shipments: IdMap::new(IdSpace::Shipment, shipments.iter().map(|s| s.id.clone()))?,
            skills: IdMap::new(
                IdSpace::Skill,
                skills
                    .iter()
                    .filter(|skill| referenced.contains(skill.id.as_str()))
                    .map(|skill| skill.id.clone()),
            )?,
        })
    }

    /// Same numbering as [`RunIds::build`], tolerating duplicates. Used to
    /// keep validating a dataset whose ids already failed.
    pub fn build_first_seen(
        vehicles: &[Vehicle],
        jobs: &[Job],
        shipments: &[Shipment],
        skills: &[Skill],
    ) -> Self {
        let referenced = referenced_skills(vehicles, jobs, shipments);

        Self {
            vehicles: IdMap::first_seen(IdSpace::Vehicle, vehicles.iter().map(|v| v.id.clone())),
            jobs: IdMap::first_seen(IdSpace::Job, jobs.iter().map(|j| j.id.clone())),
            shipments: IdMap::first_seen(IdSpace::Shipment, shipments.iter().map(|s| s.id.clone())),
            skills: IdMap::first_seen(
                IdSpace::Skill,
                skills
                    .iter()
                    .filter(|skill| referenced.contains(skill.id.as_str()))
                    .map(|skill| skill.id.clone()),
            ),
        }
    }

    /// Map skill ids, dropping repeats but keeping first-seen order.
    pub fn map_skills(&self, skill_ids: &[String]) -> Result<Vec<u64>, MappingError> {
        let mut seen = HashSet::new();
        let mut mapped = Vec::with_capacity(skill_ids.len());
        for skill_id in skill_ids {
            let solver_id = self.skills.forward(skill_id)?;
            if seen.insert(solver_id) {
                mapped.push(solver_id);
            }
        }
        Ok(mapped)
    }
}

/// Every skill id mentioned by an entity of the run.
pub fn referenced_skills<'a>(
    vehicles: &'a [Vehicle],
    jobs: &'a [Job],
    shipments: &'a [Shipment],
) -> HashSet<&'a str> {
    vehicles
        .iter()
        .flat_map(|v| v.skills.iter())
        .chain(jobs.iter().flat_map(|j| j.skills.iter()))
        .chain(shipments.iter().flat_map(|s| s.skills.iter()))
        .map(String::as_str)
        .collect()
}
