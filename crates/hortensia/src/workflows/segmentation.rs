//! Nested (H, FPD) bin assignment.
//!
//! H bins come from `edges_h`; each H bin carries its own FPD edges under `edges_f_by_h`, keyed by
//! the 1-based H bin index. The first interval is closed on both ends, later ones are `(low, high]`.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Bin edges for one retailer group or engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EdgeConfig {
    pub edges_h: Vec<f64>,
    #[serde(default)]
    pub edges_f_by_h: BTreeMap<String, Vec<f64>>,
}

impl EdgeConfig {
    pub fn new(edges_h: Vec<f64>, edges_f_by_h: BTreeMap<String, Vec<f64>>) -> Self {
        Self {
            edges_h,
            edges_f_by_h,
        }
    }

    /// FPD edges nested under H bin `h_index`.
    pub fn fpd_edges(&self, h_index: usize) -> Option<&[f64]> {
        self.edges_f_by_h
            .get(&h_index.to_string())
            .map(Vec::as_slice)
    }

    /// Lowest H edge, below which an applicant is rejected outright.
    pub fn lowest_h(&self) -> Option<f64> {
        self.edges_h.first().copied()
    }
}

/// 1-based interval index of `value`, or `None` when it falls outside the edges.
pub fn bin_index(value: f64, edges: &[f64]) -> Option<usize> {
    if edges.len() < 2 {
        return None;
    }
    edges.windows(2).enumerate().find_map(|(offset, pair)| {
        let (low, high) = (pair[0], pair[1]);
        let inside = if offset == 0 {
            value >= low && value <= high
        } else {
            value > low && value <= high
        };
        inside.then_some(offset + 1)
    })
}

/// Result of [`assign_bins`]; either index may be unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub h_index: Option<usize>,
    pub f_index: Option<usize>,
}

impl Segment {
    pub fn h_label(&self) -> Option<String> {
        self.h_index.map(|index| format!("H{index:02}"))
    }

    pub fn f_label(&self) -> Option<String> {
        self.f_index.map(|index| format!("F{index:02}"))
    }

    /// Conditions key such as `H03_F01`, when both bins are assigned.
    pub fn key(&self) -> Option<String> {
        match (self.h_label(), self.f_label()) {
            (Some(h), Some(f)) => Some(format!("{h}_{f}")),
            _ => None,
        }
    }
}

pub fn assign_bins(proba_h: f64, proba_fpd: f64, edges: &EdgeConfig) -> Segment {
    let Some(h_index) = bin_index(proba_h, &edges.edges_h) else {
        debug!(proba_h, "H probability outside configured edges");
        return Segment::default();
    };

    let f_index = match edges.fpd_edges(h_index) {
        Some(fpd_edges) if fpd_edges.len() >= 2 => bin_index(proba_fpd, fpd_edges),
        _ => {
            debug!(h_index, "no FPD edges for H bin");
            None
        }
    };
    if f_index.is_none() {
        debug!(h_index, proba_fpd, "FPD probability not segmented");
    }

    Segment {
        h_index: Some(h_index),
        f_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges() -> EdgeConfig {
        let mut by_h = BTreeMap::new();
        by_h.insert("1".to_string(), vec![0.0, 0.1, 0.3]);
        by_h.insert("2".to_string(), vec![0.0, 0.05, 0.2, 0.4]);
        by_h.insert("3".to_string(), vec![0.1]);
        EdgeConfig::new(vec![0.2, 0.5, 0.8, 1.0], by_h)
    }

    #[test]
    fn interior_edges_belong_to_the_lower_bin() {
        let segment = assign_bins(0.5, 0.1, &edges());
        assert_eq!(segment.h_label().as_deref(), Some("H01"));
        assert_eq!(segment.f_label().as_deref(), Some("F01"));
        assert_eq!(segment.key().as_deref(), Some("H01_F01"));

        assert_eq!(bin_index(0.5, &[0.2, 0.5, 0.8]), Some(1));
        assert_eq!(bin_index(0.50001, &[0.2, 0.5, 0.8]), Some(2));
    }

    #[test]
    fn first_interval_is_closed_on_both_ends() {
        assert_eq!(bin_index(0.2, &[0.2, 0.5, 0.8]), Some(1));
        assert_eq!(bin_index(0.8, &[0.2, 0.5, 0.8]), Some(2));
    }

    #[test]
    fn out_of_range_probabilities_are_unassigned() {
        assert_eq!(assign_bins(0.19, 0.1, &edges()), Segment::default());
        assert_eq!(assign_bins(1.01, 0.1, &edges()), Segment::default());
        assert_eq!(bin_index(f64::NAN, &[0.0, 1.0]), None);
    }

    #[test]
    fn missing_or_short_fpd_edges_leave_fpd_unassigned() {
        let config = edges();
        let short = assign_bins(0.9, 0.1, &config);
        assert_eq!(short.h_label().as_deref(), Some("H03"));
        assert_eq!(short.f_index, None);
        assert_eq!(short.key(), None);

        let mut without = config.clone();
        without.edges_f_by_h.remove("2");
        assert_eq!(assign_bins(0.6, 0.1, &without).f_index, None);

        let above = assign_bins(0.6, 0.41, &config);
        assert_eq!(above.h_index, Some(2));
        assert_eq!(above.f_index, None);
    }

    #[test]
    fn assignment_is_idempotent() {
        let config = edges();
        assert_eq!(assign_bins(0.7, 0.25, &config), assign_bins(0.7, 0.25, &config));
        assert_eq!(assign_bins(0.7, 0.25, &config).key().as_deref(), Some("H02_F03"));
    }

    #[test]
    fn too_few_edges_assign_nothing() {
        let config = EdgeConfig::new(vec![0.5], BTreeMap::new());
        assert_eq!(assign_bins(0.5, 0.5, &config), Segment::default());
    }
}
