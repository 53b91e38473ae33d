//! Double differenced observables between two receivers.
use std::collections::BTreeMap;

use crate::{measurement::PseudorangeMeasurement, prelude::SV};

/// One satellite's observables differenced across both receivers
/// and against the reference satellite. Receiver and satellite
/// clock terms are gone by construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DoubleDifference {
    /// Code double difference (meters)
    pub code_m: f64,

    /// Phase double difference, when both sites track carrier (cycles)
    pub phase_cycles: Option<f64>,

    /// Rover side elevation of the differenced satellite, used
    /// for weighting (decimal degrees)
    pub elevation_deg: f64,
}

/// All double differences of one epoch, keyed by [SV]. The reference
/// satellite itself carries no difference.
#[derive(Debug, Clone)]
pub(crate) struct DoubleDifferences {
    /// Pivot satellite: highest rover elevation among the satellites
    /// common to both sites (ascending [SV] on ties).
    pub reference: SV,

    /// [DoubleDifference] per differenced [SV].
    pub inner: BTreeMap<SV, DoubleDifference>,
}

impl DoubleDifferences {
    /// Forms double differences from both sites' raw measurements.
    /// Returns None when fewer than 2 satellites are common.
    pub fn form(
        rover: &[PseudorangeMeasurement],
        base: &[PseudorangeMeasurement],
    ) -> Option<Self> {
        let base_by_sv: BTreeMap<SV, &PseudorangeMeasurement> =
            base.iter().map(|m| (m.sv, m)).collect();

        let mut common: Vec<(&PseudorangeMeasurement, &PseudorangeMeasurement)> = rover
            .iter()
            .filter_map(|r| base_by_sv.get(&r.sv).map(|b| (r, *b)))
            .collect();

        if common.len() < 2 {
            return None;
        }

        common.sort_by(|(a, _), (b, _)| {
            b.elevation_deg
                .partial_cmp(&a.elevation_deg)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.sv.cmp(&b.sv))
        });

        let (pivot_rover, pivot_base) = common[0];

        let sd_reference_code = pivot_rover.pseudo_range_m - pivot_base.pseudo_range_m;
        let sd_reference_phase = match (
            pivot_rover.carrier_phase_cycles,
            pivot_base.carrier_phase_cycles,
        ) {
            (Some(r), Some(b)) => Some(r - b),
            _ => None,
        };

        let mut inner = BTreeMap::new();

        for (rover_m, base_m) in &common[1..] {
            let code_m =
                (rover_m.pseudo_range_m - base_m.pseudo_range_m) - sd_reference_code;

            let phase_cycles = match (
                rover_m.carrier_phase_cycles,
                base_m.carrier_phase_cycles,
                sd_reference_phase,
            ) {
                (Some(r), Some(b), Some(reference)) => Some((r - b) - reference),
                _ => None,
            };

            inner.insert(
                rover_m.sv,
                DoubleDifference {
                    code_m,
                    phase_cycles,
                    elevation_deg: rover_m.elevation_deg,
                },
            );
        }

        Some(Self {
            reference: pivot_rover.sv,
            inner,
        })
    }

    /// Differenced satellites carrying a phase observable, ascending.
    pub fn phase_sv_sorted(&self) -> Vec<SV> {
        self.inner
            .iter()
            .filter(|(_, dd)| dd.phase_cycles.is_some())
            .map(|(sv, _)| *sv)
            .collect()
    }

    /// Number of phase double differences.
    pub fn phase_ndf(&self) -> usize {
        self.inner
            .values()
            .filter(|dd| dd.phase_cycles.is_some())
            .count()
    }
}
