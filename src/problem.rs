use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// The type used for inventory and flow quantity
pub type Quantity = f64;
/// The type used for cost
pub type Cost = f64;
/// The integer label of a planning period
pub type Period = i64;

/// The two fixed echelons of the supply chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Site {
    /// The upstream holding site
    Pack,
    /// The downstream consumption site
    Gourmet,
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Pack => write!(f, "Pack"),
            Site::Gourmet => write!(f, "Gourmet"),
        }
    }
}

/// A packing SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Identity key of the packing
    pub id: String,
    /// Unit acquisition price
    pub unit_price: Cost,
    /// Physical size. Passed through to consumers, never read by the model
    pub size: u32,
    /// Color. Passed through to consumers, never read by the model
    pub color: String,
}

/// Demand and order bounds for one (item, period) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandRecord {
    pub item: String,
    pub period: Period,
    /// Quantity consumed at the downstream site in this period
    pub demand: Quantity,
    /// Smallest admissible acquisition when an order is placed
    pub min_order_qty: Quantity,
    /// Largest admissible acquisition in this period
    pub max_order_qty: Quantity,
}

/// Inventory facts for one (site, item) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteStock {
    pub site: Site,
    pub item: String,
    /// Inventory on hand at the boundary period preceding the horizon
    pub initial_inventory: Quantity,
    /// Inventory floor the site must not drop below
    pub minimum_inventory: Quantity,
    /// Per-unit, per-period holding cost
    pub holding_cost: Cost,
}

/// Transfer bounds for one item. Consumed by validation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferBounds {
    pub item: String,
    pub min_transfer_qty: Quantity,
    pub max_transfer_qty: Quantity,
    /// Transfer lead time in periods. Carried through, not bound by any formulation
    pub lead_time: u32,
}

/// The raw input tables of a procurement problem, before integrity checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemTables {
    pub items: Vec<Item>,
    pub demand: Vec<DemandRecord>,
    pub inventory: Vec<SiteStock>,
    #[serde(default)]
    pub distribution: Vec<TransferBounds>,
}

/// A validated procurement problem instance.
///
/// Construction runs every data-integrity check; all later stages
/// (set/parameter building, the model itself) assume the completeness
/// contract established here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ProblemTables")]
pub struct Problem {
    items: Vec<Item>,
    demand: Vec<DemandRecord>,
    inventory: Vec<SiteStock>,
    distribution: Vec<TransferBounds>,
}

impl Problem {
    pub fn new(
        items: Vec<Item>,
        demand: Vec<DemandRecord>,
        inventory: Vec<SiteStock>,
        distribution: Vec<TransferBounds>,
    ) -> Result<Problem, ProblemConstructionError> {
        use ProblemConstructionError::*;

        if items.is_empty() {
            return Err(NoItems);
        }

        let mut ids = HashSet::new();
        for item in &items {
            if !ids.insert(item.id.as_str()) {
                return Err(DuplicateItem(item.id.clone()));
            }
        }

        let periods: BTreeSet<Period> = demand.iter().map(|d| d.period).collect();
        if periods.is_empty() {
            return Err(NoPeriods);
        }

        // the period set must be consecutive integers
        for (prev, next) in periods.iter().zip(periods.iter().skip(1)) {
            if next - prev != 1 {
                return Err(PeriodsNotContiguous {
                    prev: *prev,
                    next: *next,
                });
            }
        }

        let mut demand_keys = HashSet::new();
        for rec in &demand {
            if !ids.contains(rec.item.as_str()) {
                return Err(UnknownDemandItem {
                    item: rec.item.clone(),
                });
            }
            if !demand_keys.insert((rec.item.as_str(), rec.period)) {
                return Err(DuplicateDemandRecord {
                    item: rec.item.clone(),
                    period: rec.period,
                });
            }
            if rec.demand < 0.0 {
                return Err(NegativeDemand {
                    item: rec.item.clone(),
                    period: rec.period,
                });
            }
            if rec.min_order_qty < 0.0 || rec.min_order_qty > rec.max_order_qty {
                return Err(OrderBandMismatch {
                    item: rec.item.clone(),
                    period: rec.period,
                });
            }
        }

        let mut stock_keys = HashSet::new();
        for rec in &inventory {
            if !ids.contains(rec.item.as_str()) {
                return Err(UnknownStockItem {
                    site: rec.site,
                    item: rec.item.clone(),
                });
            }
            if !stock_keys.insert((rec.site, rec.item.as_str())) {
                return Err(DuplicateStockRecord {
                    site: rec.site,
                    item: rec.item.clone(),
                });
            }
            for (field, value) in [
                ("initial_inventory", rec.initial_inventory),
                ("minimum_inventory", rec.minimum_inventory),
                ("holding_cost", rec.holding_cost),
            ] {
                if value < 0.0 {
                    return Err(NegativeStockValue {
                        site: rec.site,
                        item: rec.item.clone(),
                        field,
                    });
                }
            }
        }

        let mut transfer_keys = HashSet::new();
        for rec in &distribution {
            if !ids.contains(rec.item.as_str()) {
                return Err(UnknownDistributionItem {
                    item: rec.item.clone(),
                });
            }
            if !transfer_keys.insert(rec.item.as_str()) {
                return Err(DuplicateDistributionRecord {
                    item: rec.item.clone(),
                });
            }
            if rec.min_transfer_qty > rec.max_transfer_qty {
                return Err(TransferBandMismatch {
                    item: rec.item.clone(),
                });
            }
        }

        // every (item, period) pair implied by the cross product must be present
        for item in &items {
            for period in &periods {
                if !demand_keys.contains(&(item.id.as_str(), *period)) {
                    return Err(MissingDemand {
                        item: item.id.clone(),
                        period: *period,
                    });
                }
            }
        }

        // likewise for every (site, item) pair
        for item in &items {
            for site in [Site::Pack, Site::Gourmet] {
                if !stock_keys.contains(&(site, item.id.as_str())) {
                    return Err(MissingStock {
                        site,
                        item: item.id.clone(),
                    });
                }
            }
        }

        Ok(Problem {
            items,
            demand,
            inventory,
            distribution,
        })
    }

    /// The packing items of the problem, in input order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// The demand table, one record per (item, period)
    pub fn demand(&self) -> &[DemandRecord] {
        &self.demand
    }

    /// The site-inventory table, one record per (site, item)
    pub fn inventory(&self) -> &[SiteStock] {
        &self.inventory
    }

    /// The transfer-bound table, at most one record per item
    pub fn distribution(&self) -> &[TransferBounds] {
        &self.distribution
    }

    /// The planning periods, ascending. Derived from the demand table on
    /// every call.
    pub fn periods(&self) -> Vec<Period> {
        let set: BTreeSet<Period> = self.demand.iter().map(|d| d.period).collect();
        set.into_iter().collect()
    }
}

impl TryFrom<ProblemTables> for Problem {
    type Error = ProblemConstructionError;

    fn try_from(tables: ProblemTables) -> Result<Problem, ProblemConstructionError> {
        Problem::new(
            tables.items,
            tables.demand,
            tables.inventory,
            tables.distribution,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProblemConstructionError {
    /// The item table is empty
    NoItems,
    /// The demand table carries no periods
    NoPeriods,
    /// Two rows of the item table share a key
    DuplicateItem(String),
    /// Two rows of the demand table share an (item, period) key
    DuplicateDemandRecord { item: String, period: Period },
    /// Two rows of the inventory table share a (site, item) key
    DuplicateStockRecord { site: Site, item: String },
    /// Two rows of the distribution table share an item key
    DuplicateDistributionRecord { item: String },
    /// A demand row references an item missing from the item table
    UnknownDemandItem { item: String },
    /// An inventory row references an item missing from the item table
    UnknownStockItem { site: Site, item: String },
    /// A distribution row references an item missing from the item table
    UnknownDistributionItem { item: String },
    /// The period labels are not consecutive integers
    PeriodsNotContiguous { prev: Period, next: Period },
    /// An (item, period) pair implied by the cross product has no demand row
    MissingDemand { item: String, period: Period },
    /// A (site, item) pair implied by the cross product has no inventory row
    MissingStock { site: Site, item: String },
    /// Demand must be nonnegative
    NegativeDemand { item: String, period: Period },
    /// Order band must satisfy 0 <= min <= max
    OrderBandMismatch { item: String, period: Period },
    /// Inventory quantities and costs must be nonnegative
    NegativeStockValue {
        site: Site,
        item: String,
        field: &'static str,
    },
    /// Transfer band must satisfy min <= max
    TransferBandMismatch { item: String },
}

impl fmt::Display for ProblemConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProblemConstructionError::*;
        match self {
            NoItems => write!(f, "the item table is empty"),
            NoPeriods => write!(f, "the demand table carries no periods"),
            DuplicateItem(item) => write!(f, "duplicate item '{}'", item),
            DuplicateDemandRecord { item, period } => {
                write!(f, "duplicate demand record ({}, {})", item, period)
            }
            DuplicateStockRecord { site, item } => {
                write!(f, "duplicate inventory record ({}, {})", site, item)
            }
            DuplicateDistributionRecord { item } => {
                write!(f, "duplicate distribution record for '{}'", item)
            }
            UnknownDemandItem { item } => {
                write!(f, "demand row references unknown item '{}'", item)
            }
            UnknownStockItem { site, item } => {
                write!(
                    f,
                    "inventory row ({}, {}) references an unknown item",
                    site, item
                )
            }
            UnknownDistributionItem { item } => {
                write!(f, "distribution row references unknown item '{}'", item)
            }
            PeriodsNotContiguous { prev, next } => {
                write!(
                    f,
                    "periods are not consecutive: {} is followed by {}",
                    prev, next
                )
            }
            MissingDemand { item, period } => {
                write!(f, "no demand row for item '{}' in period {}", item, period)
            }
            MissingStock { site, item } => {
                write!(f, "no inventory row for ({}, {})", site, item)
            }
            NegativeDemand { item, period } => {
                write!(f, "negative demand for ({}, {})", item, period)
            }
            OrderBandMismatch { item, period } => {
                write!(f, "invalid order band for ({}, {})", item, period)
            }
            NegativeStockValue { site, item, field } => {
                write!(f, "negative {} for ({}, {})", field, site, item)
            }
            TransferBandMismatch { item } => {
                write!(f, "min transfer quantity exceeds max for '{}'", item)
            }
        }
    }
}

impl std::error::Error for ProblemConstructionError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, price: Cost) -> Item {
        Item {
            id: id.to_string(),
            unit_price: price,
            size: 1,
            color: "green".to_string(),
        }
    }

    fn demand(id: &str, period: Period, qty: Quantity) -> DemandRecord {
        DemandRecord {
            item: id.to_string(),
            period,
            demand: qty,
            min_order_qty: 0.0,
            max_order_qty: 100.0,
        }
    }

    fn stock(site: Site, id: &str, initial: Quantity) -> SiteStock {
        SiteStock {
            site,
            item: id.to_string(),
            initial_inventory: initial,
            minimum_inventory: 0.0,
            holding_cost: 0.1,
        }
    }

    fn valid_tables() -> (Vec<Item>, Vec<DemandRecord>, Vec<SiteStock>) {
        let items = vec![item("a", 2.0), item("b", 3.0)];
        let demand = vec![
            demand("a", 1, 5.0),
            demand("a", 2, 5.0),
            demand("b", 1, 2.0),
            demand("b", 2, 0.0),
        ];
        let inventory = vec![
            stock(Site::Pack, "a", 10.0),
            stock(Site::Gourmet, "a", 0.0),
            stock(Site::Pack, "b", 0.0),
            stock(Site::Gourmet, "b", 1.0),
        ];
        (items, demand, inventory)
    }

    #[test]
    fn accepts_complete_tables() {
        let (items, demand, inventory) = valid_tables();
        let problem = Problem::new(items, demand, inventory, Vec::new()).unwrap();
        assert_eq!(problem.periods(), vec![1, 2]);
        assert_eq!(problem.items().len(), 2);
    }

    #[test]
    fn rejects_missing_demand_pair() {
        let (items, mut demand, inventory) = valid_tables();
        demand.retain(|d| !(d.item == "b" && d.period == 2));
        let err = Problem::new(items, demand, inventory, Vec::new()).unwrap_err();
        assert_eq!(
            err,
            ProblemConstructionError::MissingDemand {
                item: "b".to_string(),
                period: 2,
            }
        );
    }

    #[test]
    fn rejects_missing_stock_pair() {
        let (items, demand, mut inventory) = valid_tables();
        inventory.retain(|s| !(s.site == Site::Gourmet && s.item == "b"));
        let err = Problem::new(items, demand, inventory, Vec::new()).unwrap_err();
        assert_eq!(
            err,
            ProblemConstructionError::MissingStock {
                site: Site::Gourmet,
                item: "b".to_string(),
            }
        );
    }

    #[test]
    fn rejects_period_gap() {
        let (items, mut demand, inventory) = valid_tables();
        for d in demand.iter_mut() {
            if d.period == 2 {
                d.period = 4;
            }
        }
        let err = Problem::new(items, demand, inventory, Vec::new()).unwrap_err();
        assert_eq!(
            err,
            ProblemConstructionError::PeriodsNotContiguous { prev: 1, next: 4 }
        );
    }

    #[test]
    fn rejects_unknown_item_in_demand() {
        let (items, mut demand, inventory) = valid_tables();
        demand.push(DemandRecord {
            item: "ghost".to_string(),
            period: 1,
            demand: 1.0,
            min_order_qty: 0.0,
            max_order_qty: 1.0,
        });
        let err = Problem::new(items, demand, inventory, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            ProblemConstructionError::UnknownDemandItem { .. }
        ));
    }

    #[test]
    fn rejects_inverted_order_band() {
        let (items, mut demand, inventory) = valid_tables();
        demand[0].min_order_qty = 50.0;
        demand[0].max_order_qty = 10.0;
        let err = Problem::new(items, demand, inventory, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            ProblemConstructionError::OrderBandMismatch { .. }
        ));
    }

    #[test]
    fn rejects_inverted_transfer_band() {
        let (items, demand, inventory) = valid_tables();
        let distribution = vec![TransferBounds {
            item: "a".to_string(),
            min_transfer_qty: 9.0,
            max_transfer_qty: 3.0,
            lead_time: 1,
        }];
        let err = Problem::new(items, demand, inventory, distribution).unwrap_err();
        assert!(matches!(
            err,
            ProblemConstructionError::TransferBandMismatch { .. }
        ));
    }

    #[test]
    fn rejects_duplicate_stock_record() {
        let (items, demand, mut inventory) = valid_tables();
        inventory.push(stock(Site::Pack, "a", 3.0));
        let err = Problem::new(items, demand, inventory, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            ProblemConstructionError::DuplicateStockRecord { .. }
        ));
    }
}
