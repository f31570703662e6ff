use std::collections::HashMap;
use std::error::Error;
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::problem::{DemandRecord, Period, Quantity};

use super::model::{ProcurementResults, SolveOutcome};

/// One row of the downstream (Gourmet) ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GourmetLedgerRow {
    #[serde(rename = "Packing ID")]
    pub item: String,
    #[serde(rename = "Period ID")]
    pub period: Period,
    #[serde(rename = "Initial Inventory")]
    pub initial_inventory: Quantity,
    #[serde(rename = "Demand")]
    pub demand: Quantity,
    #[serde(rename = "Transferred Quantity")]
    pub transferred_qty: Quantity,
    #[serde(rename = "Final Inventory")]
    pub final_inventory: Quantity,
}

/// One row of the upstream (Pack) ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackLedgerRow {
    #[serde(rename = "Packing ID")]
    pub item: String,
    #[serde(rename = "Period ID")]
    pub period: Period,
    #[serde(rename = "Initial Inventory")]
    pub initial_inventory: Quantity,
    #[serde(rename = "Transferred Quantity")]
    pub transferred_qty: Quantity,
    #[serde(rename = "Acquired Quantity")]
    pub acquired_qty: Quantity,
    #[serde(rename = "Final Inventory")]
    pub final_inventory: Quantity,
}

/// The reconciled per-site inventory ledgers of one solved instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ledgers {
    pub pack: Vec<PackLedgerRow>,
    pub gourmet: Vec<GourmetLedgerRow>,
}

impl Ledgers {
    /// Reconstructs both ledgers from the solved values and the original
    /// demand table, using the flow-balance identities in reverse. Pure
    /// function of its inputs.
    pub fn from_results(results: &ProcurementResults, demand: &[DemandRecord]) -> Ledgers {
        let demand_by_key: HashMap<(&str, Period), Quantity> = demand
            .iter()
            .map(|d| ((d.item.as_str(), d.period), d.demand))
            .collect();

        let mut pack = Vec::new();
        let mut gourmet = Vec::new();

        for (i, item) in results.item_ids.iter_enumerated() {
            for (pos, t) in results.periods.iter().enumerate() {
                let transferred = results.x[i][pos];
                let acquired = results.w[i][pos];
                // extended-set offset: position 0 is the boundary period
                let final_pack = results.yp[i][pos + 1];
                let final_gourmet = results.yg[i][pos + 1];
                // rows without a demand entry consume nothing
                let demand = demand_by_key
                    .get(&(item.as_str(), *t))
                    .copied()
                    .unwrap_or(0.0);

                gourmet.push(GourmetLedgerRow {
                    item: item.clone(),
                    period: *t,
                    initial_inventory: demand + final_gourmet - transferred,
                    demand,
                    transferred_qty: transferred,
                    final_inventory: final_gourmet,
                });
                pack.push(PackLedgerRow {
                    item: item.clone(),
                    period: *t,
                    initial_inventory: transferred + final_pack - acquired,
                    transferred_qty: transferred,
                    acquired_qty: acquired,
                    final_inventory: final_pack,
                });
            }
        }

        pack.sort_by(|a, b| a.item.cmp(&b.item).then(a.period.cmp(&b.period)));
        gourmet.sort_by(|a, b| a.item.cmp(&b.item).then(a.period.cmp(&b.period)));

        Ledgers { pack, gourmet }
    }

    /// Ledgers for a finished solve: empty unless the status was optimal.
    pub fn from_outcome(outcome: &SolveOutcome, demand: &[DemandRecord]) -> Ledgers {
        match outcome.results() {
            Some(results) => Ledgers::from_results(results, demand),
            None => Ledgers::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pack.is_empty() && self.gourmet.is_empty()
    }

    /// Writes `pack_ledger.csv` and `gourmet_ledger.csv` into `dir`.
    pub fn write_csv(&self, dir: &Path) -> Result<(), Box<dyn Error>> {
        std::fs::create_dir_all(dir)?;

        let mut writer = csv::Writer::from_path(dir.join("pack_ledger.csv"))?;
        for row in &self.pack {
            writer.serialize(row)?;
        }
        writer.flush()?;

        let mut writer = csv::Writer::from_path(dir.join("gourmet_ledger.csv"))?;
        for row in &self.gourmet {
            writer.serialize(row)?;
        }
        writer.flush()?;

        info!(
            "Wrote {} pack rows and {} gourmet rows to {}",
            self.pack.len(),
            self.gourmet.len(),
            dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Quantity;
    use grb::Status;

    fn demand_row(item: &str, period: Period, demand: Quantity) -> DemandRecord {
        DemandRecord {
            item: item.to_string(),
            period,
            demand,
            min_order_qty: 0.0,
            max_order_qty: 100.0,
        }
    }

    /// A hand-built solved bundle over items {b, a} and periods {1, 2},
    /// consistent with the flow-balance equations.
    fn solved_bundle() -> (ProcurementResults, Vec<DemandRecord>) {
        let results = ProcurementResults {
            item_ids: vec!["b".to_string(), "a".to_string()].into(),
            periods: vec![1, 2],
            w: vec![vec![2.0, 0.0], vec![0.0, 0.0]].into(),
            x: vec![vec![5.0, 0.0], vec![1.0, 1.0]].into(),
            yp: vec![vec![10.0, 7.0, 7.0], vec![5.0, 4.0, 3.0]].into(),
            yg: vec![vec![2.0, 4.0, 0.0], vec![0.0, 0.0, 0.0]].into(),
            n: None,
            objective: 4.0,
        };
        let demand = vec![
            demand_row("b", 1, 3.0),
            demand_row("b", 2, 4.0),
            demand_row("a", 1, 1.0),
            demand_row("a", 2, 1.0),
        ];
        (results, demand)
    }

    #[test]
    fn rows_are_sorted_by_item_then_period() {
        let (results, demand) = solved_bundle();
        let ledgers = Ledgers::from_results(&results, &demand);

        let keys: Vec<(&str, Period)> = ledgers
            .gourmet
            .iter()
            .map(|r| (r.item.as_str(), r.period))
            .collect();
        assert_eq!(keys, vec![("a", 1), ("a", 2), ("b", 1), ("b", 2)]);

        let keys: Vec<(&str, Period)> = ledgers
            .pack
            .iter()
            .map(|r| (r.item.as_str(), r.period))
            .collect();
        assert_eq!(keys, vec![("a", 1), ("a", 2), ("b", 1), ("b", 2)]);
    }

    #[test]
    fn reverse_identities_reconstruct_initial_inventories() {
        let (results, demand) = solved_bundle();
        let ledgers = Ledgers::from_results(&results, &demand);

        for row in &ledgers.gourmet {
            assert_eq!(
                row.initial_inventory,
                row.demand + row.final_inventory - row.transferred_qty
            );
        }
        for row in &ledgers.pack {
            assert_eq!(
                row.initial_inventory,
                row.transferred_qty + row.final_inventory - row.acquired_qty
            );
        }

        // the first-period initial inventories are the boundary values
        let b_first = ledgers.gourmet.iter().find(|r| r.item == "b").unwrap();
        assert_eq!(b_first.period, 1);
        assert_eq!(b_first.initial_inventory, 2.0);
        let b_first = ledgers.pack.iter().find(|r| r.item == "b").unwrap();
        assert_eq!(b_first.initial_inventory, 10.0);
    }

    #[test]
    fn each_initial_inventory_chains_from_the_previous_final() {
        let (results, demand) = solved_bundle();
        let ledgers = Ledgers::from_results(&results, &demand);

        for rows in ledgers.gourmet.windows(2) {
            if rows[0].item == rows[1].item {
                assert_eq!(rows[1].initial_inventory, rows[0].final_inventory);
            }
        }
        for rows in ledgers.pack.windows(2) {
            if rows[0].item == rows[1].item {
                assert_eq!(rows[1].initial_inventory, rows[0].final_inventory);
            }
        }
    }

    #[test]
    fn missing_demand_rows_default_to_zero() {
        let (results, mut demand) = solved_bundle();
        demand.retain(|d| !(d.item == "a" && d.period == 2));
        let ledgers = Ledgers::from_results(&results, &demand);

        let row = ledgers
            .gourmet
            .iter()
            .find(|r| r.item == "a" && r.period == 2)
            .unwrap();
        assert_eq!(row.demand, 0.0);
        // final 0.0 minus transferred 1.0, with the defaulted demand
        assert_eq!(row.initial_inventory, -1.0);
    }

    #[test]
    fn extraction_is_idempotent() {
        let (results, demand) = solved_bundle();
        let first = Ledgers::from_results(&results, &demand);
        let second = Ledgers::from_results(&results, &demand);
        assert_eq!(first, second);
    }

    #[test]
    fn non_optimal_outcomes_produce_empty_ledgers() {
        let (_, demand) = solved_bundle();
        let outcome = SolveOutcome::Terminated(Status::Infeasible);
        let ledgers = Ledgers::from_outcome(&outcome, &demand);
        assert!(ledgers.is_empty());
    }
}
