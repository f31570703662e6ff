use std::collections::HashMap;

use derive_more::{Deref, From, Into};
use typed_index_collections::TiVec;

use crate::problem::{Cost, DemandRecord, Period, Problem, Quantity, Site, SiteStock};

/// Dense index of an item, aligned with the item-table order.
#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, From, Into, Clone, Copy, Hash)]
pub struct ItemIndex(usize);

/// Index sets of the procurement model.
#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct Sets {
    /// Set of packing items
    pub I: Vec<ItemIndex>,
    /// Ordered set of planning periods
    pub T: Vec<Period>,
    /// Planning periods extended with the boundary period preceding the
    /// horizon, used solely to anchor the initial inventory condition
    pub T_extend: Vec<Period>,
}

impl Sets {
    pub fn new(problem: &Problem) -> Sets {
        let I = (0..problem.items().len()).map(ItemIndex).collect();
        let T = problem.periods();
        let first = *T.first().expect("the period set is validated nonempty");
        let mut T_extend = Vec::with_capacity(T.len() + 1);
        T_extend.push(first - 1);
        T_extend.extend(&T);

        Sets { I, T, T_extend }
    }

    /// The first planning period. Recomputed from `T` on every call.
    pub fn first_period(&self) -> Period {
        self.T
            .iter()
            .copied()
            .min()
            .expect("the period set is validated nonempty")
    }

    /// The last planning period.
    pub fn last_period(&self) -> Period {
        self.T
            .iter()
            .copied()
            .max()
            .expect("the period set is validated nonempty")
    }

    /// Offset of period `t` into vectors indexed over `T`.
    pub fn position(&self, t: Period) -> usize {
        let first = self.first_period();
        debug_assert!(t >= first && t <= self.last_period());
        (t - first) as usize
    }

    /// Offset of period `t` into vectors indexed over `T_extend`; accepts
    /// the boundary period `first_period() - 1`.
    pub fn ext_position(&self, t: Period) -> usize {
        let first = self.first_period();
        debug_assert!(t >= first - 1 && t <= self.last_period());
        (t - first + 1) as usize
    }
}

/// Values attached to both sites, keyed by [`Site`].
#[derive(Debug, Clone)]
pub struct SitePair<T> {
    pub pack: T,
    pub gourmet: T,
}

impl<T> SitePair<T> {
    pub fn site(&self, site: Site) -> &T {
        match site {
            Site::Pack => &self.pack,
            Site::Gourmet => &self.gourmet,
        }
    }
}

/// Parameters of the procurement model, copied out of the input tables as
/// a per-solve snapshot.
///
/// Lookups assume the completeness contract established by
/// `Problem::new`; a violated contract is a panic, not a recoverable
/// error.
#[derive(Debug, Clone)]
pub struct Parameters {
    /// Item keys by dense index, for mapping solution values back out
    pub item_ids: TiVec<ItemIndex, String>,
    /// Demand of item i in period t, indexed `[i][position(t)]`
    pub demand: TiVec<ItemIndex, Vec<Quantity>>,
    /// Unit acquisition price of item i
    pub unit_price: TiVec<ItemIndex, Cost>,
    /// Smallest admissible order of item i in period t, when one is placed
    pub min_order_qty: TiVec<ItemIndex, Vec<Quantity>>,
    /// Largest admissible order of item i in period t
    pub max_order_qty: TiVec<ItemIndex, Vec<Quantity>>,
    /// Inventory at the boundary period, per site
    pub initial_inventory: SitePair<TiVec<ItemIndex, Quantity>>,
    /// Inventory floor, per site
    pub min_inventory: SitePair<TiVec<ItemIndex, Quantity>>,
    /// Per-unit, per-period holding cost, per site
    pub holding_cost: SitePair<TiVec<ItemIndex, Cost>>,
}

impl Parameters {
    pub fn new(problem: &Problem, sets: &Sets) -> Parameters {
        let demand_rows: HashMap<(&str, Period), &DemandRecord> = problem
            .demand()
            .iter()
            .map(|d| ((d.item.as_str(), d.period), d))
            .collect();
        let stock_rows: HashMap<(Site, &str), &SiteStock> = problem
            .inventory()
            .iter()
            .map(|s| ((s.site, s.item.as_str()), s))
            .collect();

        let item_ids: TiVec<ItemIndex, String> = problem
            .items()
            .iter()
            .map(|item| item.id.clone())
            .collect::<Vec<_>>()
            .into();

        let unit_price: TiVec<ItemIndex, Cost> = problem
            .items()
            .iter()
            .map(|item| item.unit_price)
            .collect::<Vec<_>>()
            .into();

        let mut demand = Vec::with_capacity(problem.items().len());
        let mut min_order_qty = Vec::with_capacity(problem.items().len());
        let mut max_order_qty = Vec::with_capacity(problem.items().len());
        for item in problem.items() {
            let mut demand_i = Vec::with_capacity(sets.T.len());
            let mut min_i = Vec::with_capacity(sets.T.len());
            let mut max_i = Vec::with_capacity(sets.T.len());
            for t in &sets.T {
                let rec = demand_rows
                    .get(&(item.id.as_str(), *t))
                    .unwrap_or_else(|| panic!("no demand record for ({}, {})", item.id, t));
                demand_i.push(rec.demand);
                min_i.push(rec.min_order_qty);
                max_i.push(rec.max_order_qty);
            }
            demand.push(demand_i);
            min_order_qty.push(min_i);
            max_order_qty.push(max_i);
        }

        let per_site = |site: Site, field: fn(&SiteStock) -> Quantity| -> TiVec<ItemIndex, Quantity> {
            problem
                .items()
                .iter()
                .map(|item| {
                    let rec = stock_rows
                        .get(&(site, item.id.as_str()))
                        .unwrap_or_else(|| panic!("no inventory record for ({}, {})", site, item.id));
                    field(rec)
                })
                .collect::<Vec<_>>()
                .into()
        };

        Parameters {
            item_ids,
            demand: demand.into(),
            unit_price,
            min_order_qty: min_order_qty.into(),
            max_order_qty: max_order_qty.into(),
            initial_inventory: SitePair {
                pack: per_site(Site::Pack, |s| s.initial_inventory),
                gourmet: per_site(Site::Gourmet, |s| s.initial_inventory),
            },
            min_inventory: SitePair {
                pack: per_site(Site::Pack, |s| s.minimum_inventory),
                gourmet: per_site(Site::Gourmet, |s| s.minimum_inventory),
            },
            holding_cost: SitePair {
                pack: per_site(Site::Pack, |s| s.holding_cost),
                gourmet: per_site(Site::Gourmet, |s| s.holding_cost),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{DemandRecord, Item, SiteStock};

    fn problem() -> Problem {
        let items = vec![
            Item {
                id: "small".to_string(),
                unit_price: 2.0,
                size: 1,
                color: "green".to_string(),
            },
            Item {
                id: "large".to_string(),
                unit_price: 5.0,
                size: 3,
                color: "blue".to_string(),
            },
        ];
        let mut demand = Vec::new();
        for (id, base) in [("small", 10.0), ("large", 20.0)] {
            for t in 3..=5 {
                demand.push(DemandRecord {
                    item: id.to_string(),
                    period: t,
                    demand: base + t as f64,
                    min_order_qty: 1.0,
                    max_order_qty: 500.0,
                });
            }
        }
        let mut inventory = Vec::new();
        for (site, initial) in [(Site::Pack, 40.0), (Site::Gourmet, 15.0)] {
            for id in ["small", "large"] {
                inventory.push(SiteStock {
                    site,
                    item: id.to_string(),
                    initial_inventory: initial,
                    minimum_inventory: 2.0,
                    holding_cost: 0.5,
                });
            }
        }
        Problem::new(items, demand, inventory, Vec::new()).unwrap()
    }

    #[test]
    fn extended_periods_prepend_boundary() {
        let sets = Sets::new(&problem());
        assert_eq!(sets.T, vec![3, 4, 5]);
        assert_eq!(sets.T_extend, vec![2, 3, 4, 5]);
        assert_eq!(sets.first_period(), 3);
        assert_eq!(sets.last_period(), 5);
    }

    #[test]
    fn positions_map_period_labels_to_offsets() {
        let sets = Sets::new(&problem());
        assert_eq!(sets.position(3), 0);
        assert_eq!(sets.position(5), 2);
        assert_eq!(sets.ext_position(2), 0);
        assert_eq!(sets.ext_position(3), 1);
        assert_eq!(sets.ext_position(5), 3);
    }

    #[test]
    fn parameters_snapshot_the_tables() {
        let problem = problem();
        let sets = Sets::new(&problem);
        let parameters = Parameters::new(&problem, &sets);

        let small = ItemIndex(0);
        let large = ItemIndex(1);
        assert_eq!(parameters.item_ids[small], "small");
        assert_eq!(parameters.unit_price[large], 5.0);
        assert_eq!(parameters.demand[small][sets.position(4)], 14.0);
        assert_eq!(parameters.demand[large][sets.position(5)], 25.0);
        assert_eq!(parameters.max_order_qty[small][0], 500.0);
        assert_eq!(parameters.initial_inventory.site(Site::Pack)[large], 40.0);
        assert_eq!(parameters.initial_inventory.site(Site::Gourmet)[small], 15.0);
        assert_eq!(parameters.min_inventory.gourmet[small], 2.0);
        assert_eq!(parameters.holding_cost.pack[large], 0.5);
    }
}
