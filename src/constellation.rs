//! Satellite registry and per-tick state snapshots.
use itertools::Itertools;
use log::warn;

use std::collections::HashMap;

use crate::{
    prelude::{Epoch, Error, OrbitalElements, SatelliteState, WalkerShell, SV},
    propagator,
};

/// Named group of satellites sharing a propagation model.
/// Membership only changes through explicit [ConstellationSet::insert]
/// and [ConstellationSet::remove] calls, between ticks.
#[derive(Debug, Clone)]
pub struct ConstellationSet {
    /// Display name of this group
    pub name: String,
    /// Disabled groups are skipped entirely when building a [Snapshot]
    pub enabled: bool,
    satellites: HashMap<SV, OrbitalElements>,
}

impl ConstellationSet {
    /// Creates an empty, enabled group.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            satellites: HashMap::new(),
        }
    }

    /// Seeds a group from a [WalkerShell], one [SV] per member with
    /// ascending PRN numbers.
    pub fn from_walker(
        name: &str,
        constellation: gnss_rs::prelude::Constellation,
        shell: &WalkerShell,
    ) -> Result<Self, Error> {
        let mut set = Self::new(name);
        for (nth, elements) in shell.elements().into_iter().enumerate() {
            set.insert(SV::new(constellation, nth as u8 + 1), elements)?;
        }
        Ok(set)
    }

    /// Registers (or fully replaces) the [OrbitalElements] of one [SV].
    /// Elements are validated on the way in, so a [Snapshot] never
    /// trips over grossly invalid records.
    pub fn insert(&mut self, sv: SV, elements: OrbitalElements) -> Result<(), Error> {
        elements.validate()?;
        self.satellites.insert(sv, elements);
        Ok(())
    }

    /// Removes one [SV] from the group.
    pub fn remove(&mut self, sv: SV) -> Option<OrbitalElements> {
        self.satellites.remove(&sv)
    }

    /// Currently registered [OrbitalElements] for this [SV].
    pub fn elements(&self, sv: SV) -> Result<&OrbitalElements, Error> {
        self.satellites.get(&sv).ok_or(Error::MissingEphemeris(sv))
    }

    /// Iterates over the registered members.
    pub fn members(&self) -> impl Iterator<Item = (&SV, &OrbitalElements)> {
        self.satellites.iter()
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }
}

/// Immutable satellite states for one tick. Built fully, then handed
/// out: a reader never observes a partially propagated constellation.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// [Epoch] all contained states refer to
    pub epoch: Epoch,
    states: HashMap<SV, SatelliteState>,
}

impl Snapshot {
    /// Propagates every enabled member of `sets` to `epoch`.
    /// A satellite whose elements fail to propagate is excluded from
    /// this tick (and logged), it never poisons the rest of the batch.
    pub fn build(epoch: Epoch, sets: &[ConstellationSet]) -> Self {
        let mut states = HashMap::new();

        for set in sets.iter().filter(|s| s.enabled) {
            for (sv, elements) in set.members() {
                match propagator::propagate(*sv, elements, epoch) {
                    Ok(state) => {
                        states.insert(*sv, state);
                    },
                    Err(e) => {
                        warn!("{}({}) excluded from tick: {}", epoch, sv, e);
                    },
                }
            }
        }

        Self { epoch, states }
    }

    /// State of one [SV], if it was propagated this tick.
    pub fn state(&self, sv: SV) -> Option<&SatelliteState> {
        self.states.get(&sv)
    }

    /// Iterates over all propagated states.
    pub fn states(&self) -> impl Iterator<Item = &SatelliteState> {
        self.states.values()
    }

    /// All propagated [SV], in ascending order. Gives every consumer
    /// the same deterministic iteration sequence.
    pub fn sv_sorted(&self) -> Vec<SV> {
        self.states.keys().copied().sorted().collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_state(&mut self, state: SatelliteState) {
        self.states.insert(state.sv, state);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::Constellation;
    use std::str::FromStr;

    fn t0() -> Epoch {
        Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap()
    }

    #[test]
    fn walker_registration() {
        let shell = WalkerShell::gps_like(t0());
        let set = ConstellationSet::from_walker("gps", Constellation::GPS, &shell).unwrap();

        assert_eq!(set.len(), 24);
        assert!(set.elements(SV::new(Constellation::GPS, 1)).is_ok());
        assert_eq!(
            set.elements(SV::new(Constellation::GPS, 25)),
            Err(Error::MissingEphemeris(SV::new(Constellation::GPS, 25)))
        );
    }

    #[test]
    fn replacement_supersedes() {
        let shell = WalkerShell::gps_like(t0());
        let mut set = ConstellationSet::from_walker("gps", Constellation::GPS, &shell).unwrap();

        let sv = SV::new(Constellation::GPS, 1);
        let mut replacement = *set.elements(sv).unwrap();
        replacement.mean_anomaly_rad = 0.5;

        set.insert(sv, replacement).unwrap();
        assert_eq!(set.elements(sv).unwrap().mean_anomaly_rad, 0.5);
        assert_eq!(set.len(), 24);
    }

    #[test]
    fn snapshot_covers_enabled_sets_only() {
        let shell = WalkerShell::gps_like(t0());
        let mut gps = ConstellationSet::from_walker("gps", Constellation::GPS, &shell).unwrap();
        let galileo =
            ConstellationSet::from_walker("galileo", Constellation::Galileo, &shell).unwrap();

        gps.enabled = false;

        let snapshot = Snapshot::build(t0(), &[gps, galileo]);
        assert_eq!(snapshot.len(), 24);
        assert!(snapshot.state(SV::new(Constellation::GPS, 1)).is_none());
        assert!(snapshot
            .state(SV::new(Constellation::Galileo, 1))
            .is_some());
    }
}
