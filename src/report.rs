//! Flat result rows for external exporters.
//!
//! The engine's tables are exposed as plain row vectors with a stable sort
//! order (KeyID, then ClusterGroup, then Date), matching the column layout
//! downstream CSV writers expect. Serialization itself is not this
//! crate's concern.

use crate::core::EntityId;
use crate::error::Result;
use crate::kpi::{per_cluster_error, ErrorKind, NamedScore};
use crate::pipeline::EngineOutput;
use crate::similarity::Assignment;
use chrono::NaiveDate;
use std::collections::HashMap;

/// One per-entity cluster assignment row.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityClusterRow {
    pub key_id: EntityId,
    pub cluster_group: usize,
    pub date: NaiveDate,
}

/// One per-entity KPI row: all four error kinds joined on cluster id.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityKpiRow {
    pub key_id: EntityId,
    pub cluster_group: usize,
    pub mae: f64,
    pub mape: f64,
    pub mse: f64,
    pub rmse: f64,
}

/// One network-scope cluster assignment row.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkClusterRow {
    pub cluster_group: usize,
    pub date: NaiveDate,
}

/// Per-entity cluster assignments, sorted by KeyID, ClusterGroup, Date.
pub fn entity_cluster_rows(output: &EngineOutput) -> Vec<EntityClusterRow> {
    let mut rows: Vec<EntityClusterRow> = output
        .entities
        .iter()
        .filter_map(|(key, stage)| stage.clusters.as_ref().map(|c| (key, c)))
        .flat_map(|(key, clusters)| {
            clusters.assignment.iter().map(move |&(date, cluster)| EntityClusterRow {
                key_id: key.clone(),
                cluster_group: cluster,
                date,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        (&a.key_id, a.cluster_group, a.date).cmp(&(&b.key_id, b.cluster_group, b.date))
    });
    rows
}

/// Per-entity KPI summary rows, the four error kinds joined per cluster,
/// sorted by KeyID then ClusterGroup.
pub fn entity_kpi_rows(output: &EngineOutput) -> Result<Vec<EntityKpiRow>> {
    let mut smoothed = HashMap::new();
    let mut assignments: HashMap<EntityId, Assignment> = HashMap::new();
    let mut exemplar_maps = HashMap::new();
    for (key, stage) in &output.entities {
        if let Some(clusters) = &stage.clusters {
            smoothed.insert(key.clone(), stage.smoothed.clone());
            assignments.insert(key.clone(), clusters.assignment.clone());
            exemplar_maps.insert(key.clone(), clusters.exemplars.clone());
        }
    }

    let mae = per_cluster_error(&smoothed, &assignments, &exemplar_maps, ErrorKind::Mae)?;
    let mape = per_cluster_error(&smoothed, &assignments, &exemplar_maps, ErrorKind::Mape)?;
    let mse = per_cluster_error(&smoothed, &assignments, &exemplar_maps, ErrorKind::Mse)?;
    let rmse = per_cluster_error(&smoothed, &assignments, &exemplar_maps, ErrorKind::Rmse)?;

    let mut rows = Vec::new();
    for (key, mae_rows) in &mae {
        let lookup = |kind: &HashMap<EntityId, Vec<(usize, f64)>>, cluster: usize| {
            kind[key]
                .iter()
                .find(|&&(c, _)| c == cluster)
                .map(|&(_, v)| v)
                .unwrap_or(f64::NAN)
        };
        for &(cluster, mae_value) in mae_rows {
            rows.push(EntityKpiRow {
                key_id: key.clone(),
                cluster_group: cluster,
                mae: mae_value,
                mape: lookup(&mape, cluster),
                mse: lookup(&mse, cluster),
                rmse: lookup(&rmse, cluster),
            });
        }
    }
    rows.sort_by(|a, b| (&a.key_id, a.cluster_group).cmp(&(&b.key_id, b.cluster_group)));
    Ok(rows)
}

/// Network cluster assignments, sorted by ClusterGroup then Date.
pub fn network_cluster_rows(output: &EngineOutput) -> Vec<NetworkClusterRow> {
    let mut rows: Vec<NetworkClusterRow> = output
        .network
        .iter()
        .flat_map(|network| {
            network.assignment.iter().map(|&(date, cluster)| NetworkClusterRow {
                cluster_group: cluster,
                date,
            })
        })
        .collect();
    rows.sort_by_key(|r| (r.cluster_group, r.date));
    rows
}

/// Network validity scores as named rows, in a stable order.
pub fn network_quality_rows(output: &EngineOutput) -> Vec<NamedScore> {
    output
        .network
        .as_ref()
        .and_then(|n| n.quality.as_ref())
        .map(|q| q.scores())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::ExemplarMap;
    use crate::pipeline::{EntityClusters, EntityStage};
    use crate::core::ProfileTable;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn stage_with_clusters() -> EntityStage {
        let mut table = ProfileTable::new(3, vec![d(1), d(2), d(3)]).unwrap();
        for col in 0..3 {
            for bucket in 0..3 {
                let base = if col < 2 { 10.0 } else { 50.0 };
                table.set(bucket, col, Some(base + bucket as f64));
            }
        }
        let mut exemplars = ExemplarMap::new();
        exemplars.insert(0, d(1));
        exemplars.insert(1, d(3));
        EntityStage {
            smoothed: table,
            clusters: Some(EntityClusters {
                assignment: vec![(d(1), 0), (d(2), 0), (d(3), 1)],
                exemplars,
                converged: true,
            }),
        }
    }

    #[test]
    fn cluster_rows_are_sorted_and_complete() {
        let mut output = EngineOutput::default();
        output.entities.insert("B".into(), stage_with_clusters());
        output.entities.insert("A".into(), stage_with_clusters());

        let rows = entity_cluster_rows(&output);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].key_id, "A");
        assert_eq!(rows[3].key_id, "B");
        // Within an entity: cluster order, then date order.
        assert_eq!(rows[0].cluster_group, 0);
        assert_eq!(rows[0].date, d(1));
        assert_eq!(rows[2].cluster_group, 1);
    }

    #[test]
    fn kpi_rows_join_all_four_kinds() {
        let mut output = EngineOutput::default();
        output.entities.insert("A".into(), stage_with_clusters());

        let rows = entity_kpi_rows(&output).unwrap();
        assert_eq!(rows.len(), 2);
        let row = &rows[0];
        assert_eq!(row.cluster_group, 0);
        // Member date 2 equals the exemplar offset by 0; identical columns
        // give zero error; RMSE^2 == MSE always.
        assert!(row.rmse * row.rmse - row.mse < 1e-12);
        assert!(row.rmse >= row.mae - 1e-12);
    }

    #[test]
    fn network_rows_empty_without_network_stage() {
        let output = EngineOutput::default();
        assert!(network_cluster_rows(&output).is_empty());
        assert!(network_quality_rows(&output).is_empty());
    }
}
