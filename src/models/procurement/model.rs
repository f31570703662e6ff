use grb::prelude::*;
use grb::{Expr, Status};
use itertools::iproduct;
use log::{debug, info, warn};
use typed_index_collections::TiVec;

use crate::config::{BatchingParams, DiscountParams, ParameterSet, SolverSettings};
use crate::models::utils::{AddVars, ExtractValues};
use crate::problem::{Period, Problem};

use super::sets_and_parameters::{ItemIndex, Parameters, Sets};

/// The decision variables of the procurement model.
///
/// `w`, `x`, `wb` and `xb` are indexed `[i][position(t)]` over the
/// planning periods; the inventory families `yp`/`yg` are indexed
/// `[i][ext_position(t)]` over the extended period set. The extension
/// families are only present once the corresponding extension has been
/// applied.
pub struct Variables {
    /// Quantity acquired into the upstream site
    pub w: TiVec<ItemIndex, Vec<Var>>,
    /// Quantity transferred upstream -> downstream
    pub x: TiVec<ItemIndex, Vec<Var>>,
    /// End-of-period inventory at the upstream site
    pub yp: TiVec<ItemIndex, Vec<Var>>,
    /// End-of-period inventory at the downstream site
    pub yg: TiVec<ItemIndex, Vec<Var>>,
    /// 1 if an order for the item is placed in the period
    pub wb: TiVec<ItemIndex, Vec<Var>>,
    /// 1 if the item is transferred in the period
    pub xb: TiVec<ItemIndex, Vec<Var>>,
    /// Transport batches used per period
    pub n: Option<Vec<Var>>,
    /// 1 if the volume discount applies for (i, t)
    pub dc: Option<TiVec<ItemIndex, Vec<Var>>>,
    /// Share of the acquisition the discount applies to
    pub wd: Option<TiVec<ItemIndex, Vec<Var>>>,
}

/// Ordered list of named cost contributions.
///
/// The base model and each extension push their terms here; the sum is
/// handed to the solver exactly once, so composing extensions cannot
/// depend on application order.
#[derive(Default)]
pub struct Objective {
    terms: Vec<(String, Expr)>,
}

impl Objective {
    pub fn new() -> Objective {
        Objective::default()
    }

    pub fn push(&mut self, name: &str, term: Expr) {
        self.terms.push((name.to_string(), term));
    }

    pub fn term_names(&self) -> Vec<&str> {
        self.terms.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Sums all contributions and sets the minimization objective.
    pub fn apply(self, model: &mut Model) -> grb::Result<()> {
        let total = self.terms.into_iter().map(|(_, term)| term).grb_sum();
        model.set_objective(total, Minimize)
    }
}

pub struct ProcurementSolver {}

#[allow(non_snake_case)]
impl ProcurementSolver {
    /// Builds the base model: variable families, constraints C1-C9 and the
    /// base cost terms. The objective is returned unset so that extensions
    /// can contribute before [`Objective::apply`].
    pub fn build(
        sets: &Sets,
        parameters: &Parameters,
        config: &ParameterSet,
    ) -> grb::Result<(Model, Variables, Objective)> {
        info!(
            "Building procurement model: {} items, {} periods",
            sets.I.len(),
            sets.T.len()
        );

        let mut model = Model::new("procurement")?;

        //*************CREATE VARIABLES*************//
        let items = sets.I.len();
        let periods = sets.T.len();
        let extended = sets.T_extend.len();

        // acquisition into Pack
        let w: TiVec<ItemIndex, Vec<Var>> = (items, periods).integer(&mut model, "w")?.into();
        // transfer Pack -> Gourmet
        let x: TiVec<ItemIndex, Vec<Var>> = (items, periods).integer(&mut model, "x")?.into();
        // end-of-period inventories, anchored one period before the horizon
        let yp: TiVec<ItemIndex, Vec<Var>> = (items, extended).integer(&mut model, "yp")?.into();
        let yg: TiVec<ItemIndex, Vec<Var>> = (items, extended).integer(&mut model, "yg")?.into();
        // order-placed and transfer-active indicators
        let wb: TiVec<ItemIndex, Vec<Var>> = (items, periods).binary(&mut model, "wb")?.into();
        let xb: TiVec<ItemIndex, Vec<Var>> = (items, periods).binary(&mut model, "xb")?.into();

        model.update()?;

        //*************ADD CONSTRAINTS*************//
        Self::inventory_capacity(&mut model, sets, config, &yp, &yg)?;
        Self::order_quantity_gating(&mut model, sets, parameters, &w, &wb)?;
        Self::acquisition_limit(&mut model, sets, config, &w)?;
        Self::transport_limit(&mut model, sets, config, &x)?;
        Self::flow_balance(&mut model, sets, parameters, &w, &x, &yp, &yg)?;
        Self::minimum_inventory(&mut model, sets, parameters, &yg)?;
        Self::dwell_limit(&mut model, sets, config, &x, &yp)?;
        Self::boundary_inventory(&mut model, sets, parameters, &yp, &yg)?;
        if let Some(limit) = config.diversity_limit {
            Self::transport_diversity(&mut model, sets, config, limit, &x, &xb)?;
        }

        //*************BASE COST TERMS*************//
        let mut objective = Objective::new();
        objective.push(
            "acquisition",
            iproduct!(&sets.I, &sets.T)
                .map(|(i, t)| parameters.unit_price[*i] * w[*i][sets.position(*t)])
                .grb_sum(),
        );
        objective.push(
            "holding_pack",
            iproduct!(&sets.I, &sets.T)
                .map(|(i, t)| parameters.holding_cost.pack[*i] * yp[*i][sets.ext_position(*t)])
                .grb_sum(),
        );
        objective.push(
            "holding_gourmet",
            iproduct!(&sets.I, &sets.T)
                .map(|(i, t)| parameters.holding_cost.gourmet[*i] * yg[*i][sets.ext_position(*t)])
                .grb_sum(),
        );

        let variables = Variables {
            w,
            x,
            yp,
            yg,
            wb,
            xb,
            n: None,
            dc: None,
            wd: None,
        };

        Ok((model, variables, objective))
    }

    /// C1: per-period inventory capacity at both sites.
    fn inventory_capacity(
        model: &mut Model,
        sets: &Sets,
        config: &ParameterSet,
        yp: &TiVec<ItemIndex, Vec<Var>>,
        yg: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        for t in &sets.T {
            let e = sets.ext_position(*t);
            let pack = sets.I.iter().map(|i| yp[*i][e]).grb_sum();
            model.add_constr(
                &format!("inventory_cap_pack_{}", t),
                c!(pack <= config.inventory_capacity_pack),
            )?;
            let gourmet = sets.I.iter().map(|i| yg[*i][e]).grb_sum();
            model.add_constr(
                &format!("inventory_cap_gourmet_{}", t),
                c!(gourmet <= config.inventory_capacity_gourmet),
            )?;
        }
        Ok(())
    }

    /// C2: an acquisition is either zero or within the order band,
    /// coupled through the order-placed indicator.
    fn order_quantity_gating(
        model: &mut Model,
        sets: &Sets,
        parameters: &Parameters,
        w: &TiVec<ItemIndex, Vec<Var>>,
        wb: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        for (i, t) in iproduct!(&sets.I, &sets.T) {
            let p = sets.position(*t);
            model.add_constr(
                &format!("order_ub_{}_{}", **i, t),
                c!(w[*i][p] <= parameters.max_order_qty[*i][p] * wb[*i][p]),
            )?;
            model.add_constr(
                &format!("order_lb_{}_{}", **i, t),
                c!(w[*i][p] >= parameters.min_order_qty[*i][p] * wb[*i][p]),
            )?;
        }
        Ok(())
    }

    /// C3: cap on the total quantity acquired per period.
    fn acquisition_limit(
        model: &mut Model,
        sets: &Sets,
        config: &ParameterSet,
        w: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        for t in &sets.T {
            let p = sets.position(*t);
            let total = sets.I.iter().map(|i| w[*i][p]).grb_sum();
            model.add_constr(
                &format!("acquisition_cap_{}", t),
                c!(total <= config.acquisition_limit_by_period),
            )?;
        }
        Ok(())
    }

    /// C4: cap on the total quantity transferred per period.
    fn transport_limit(
        model: &mut Model,
        sets: &Sets,
        config: &ParameterSet,
        x: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        for t in &sets.T {
            let p = sets.position(*t);
            let total = sets.I.iter().map(|i| x[*i][p]).grb_sum();
            model.add_constr(
                &format!("transport_cap_{}", t),
                c!(total <= config.transport_limit_by_period),
            )?;
        }
        Ok(())
    }

    /// C5: flow conservation at both sites for every (item, period).
    fn flow_balance(
        model: &mut Model,
        sets: &Sets,
        parameters: &Parameters,
        w: &TiVec<ItemIndex, Vec<Var>>,
        x: &TiVec<ItemIndex, Vec<Var>>,
        yp: &TiVec<ItemIndex, Vec<Var>>,
        yg: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        for (i, t) in iproduct!(&sets.I, &sets.T) {
            let p = sets.position(*t);
            let cur = sets.ext_position(*t);
            let prev = cur - 1;
            let demand = parameters.demand[*i][p];
            model.add_constr(
                &format!("flow_gourmet_{}_{}", **i, t),
                c!(yg[*i][cur] == yg[*i][prev] + x[*i][p] - demand),
            )?;
            model.add_constr(
                &format!("flow_pack_{}_{}", **i, t),
                c!(yp[*i][cur] == yp[*i][prev] + w[*i][p] - x[*i][p]),
            )?;
        }
        Ok(())
    }

    /// C6: service-level floor at the downstream site.
    fn minimum_inventory(
        model: &mut Model,
        sets: &Sets,
        parameters: &Parameters,
        yg: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        for (i, t) in iproduct!(&sets.I, &sets.T) {
            let e = sets.ext_position(*t);
            model.add_constr(
                &format!("min_inventory_{}_{}", **i, t),
                c!(yg[*i][e] >= parameters.min_inventory.gourmet[*i]),
            )?;
        }
        Ok(())
    }

    /// C7: stock held upstream at period t must be covered by transfers
    /// within the next `max_dwell_periods` periods. Vacuous near the
    /// horizon end, where no such future periods exist.
    fn dwell_limit(
        model: &mut Model,
        sets: &Sets,
        config: &ParameterSet,
        x: &TiVec<ItemIndex, Vec<Var>>,
        yp: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        let dwell = config.max_dwell_periods as Period;
        let last = sets.last_period();
        for t in &sets.T {
            if *t > last - dwell {
                continue;
            }
            for i in &sets.I {
                let outflow = (1..=dwell).map(|l| x[*i][sets.position(t + l)]).grb_sum();
                model.add_constr(
                    &format!("dwell_{}_{}", **i, t),
                    c!(outflow >= yp[*i][sets.ext_position(*t)]),
                )?;
            }
        }
        Ok(())
    }

    /// C8: anchor the inventories at the boundary period.
    fn boundary_inventory(
        model: &mut Model,
        sets: &Sets,
        parameters: &Parameters,
        yp: &TiVec<ItemIndex, Vec<Var>>,
        yg: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        let boundary = sets.ext_position(sets.first_period() - 1);
        for i in &sets.I {
            model.add_constr(
                &format!("initial_pack_{}", **i),
                c!(yp[*i][boundary] == parameters.initial_inventory.pack[*i]),
            )?;
            model.add_constr(
                &format!("initial_gourmet_{}", **i),
                c!(yg[*i][boundary] == parameters.initial_inventory.gourmet[*i]),
            )?;
        }
        Ok(())
    }

    /// C9: cap on the number of distinct items transferred per period,
    /// with the transfer-active indicator forced by a big-M coupling.
    fn transport_diversity(
        model: &mut Model,
        sets: &Sets,
        config: &ParameterSet,
        limit: usize,
        x: &TiVec<ItemIndex, Vec<Var>>,
        xb: &TiVec<ItemIndex, Vec<Var>>,
    ) -> grb::Result<()> {
        for t in &sets.T {
            let p = sets.position(*t);
            let count = sets.I.iter().map(|i| xb[*i][p]).grb_sum();
            model.add_constr(&format!("diversity_{}", t), c!(count <= limit as f64))?;
        }
        for (i, t) in iproduct!(&sets.I, &sets.T) {
            let p = sets.position(*t);
            model.add_constr(
                &format!("transfer_active_{}_{}", **i, t),
                c!(x[*i][p] <= config.transport_limit_by_period * xb[*i][p]),
            )?;
        }
        Ok(())
    }

    /// Transport batching extension: transport is priced per discrete
    /// carrying unit, so the batch count is squeezed between the exact
    /// volume ratio and ratio + 1.
    pub fn add_transport_batching(
        model: &mut Model,
        variables: &mut Variables,
        sets: &Sets,
        params: &BatchingParams,
        objective: &mut Objective,
    ) -> grb::Result<()> {
        debug!(
            "Adding transport batching: capacity {}, cost {}",
            params.batch_capacity, params.batch_cost
        );

        let n: Vec<Var> = sets.T.len().integer(model, "n")?;
        model.update()?;

        for t in &sets.T {
            let p = sets.position(*t);
            let ratio = sets
                .I
                .iter()
                .map(|i| (1.0 / params.batch_capacity) * variables.x[*i][p])
                .grb_sum();
            model.add_constr(&format!("batch_lb_{}", t), c!(n[p] >= ratio.clone()))?;
            model.add_constr(&format!("batch_ub_{}", t), c!(n[p] <= ratio + 1.0))?;
        }

        objective.push(
            "transport_batches",
            n.iter().map(|v| params.batch_cost * *v).grb_sum(),
        );
        variables.n = Some(n);
        Ok(())
    }

    /// Quantity discount extension. The discount applies to the whole
    /// acquired quantity once it reaches the threshold (inclusive); since
    /// `w` is integer, `w >= threshold` linearizes exactly as
    /// `M dc >= w - (threshold - 1)`. The helper `wd = w * dc` carries the
    /// discounted share into the objective.
    pub fn add_quantity_discount(
        model: &mut Model,
        variables: &mut Variables,
        sets: &Sets,
        parameters: &Parameters,
        params: &DiscountParams,
        objective: &mut Objective,
    ) -> grb::Result<()> {
        debug!(
            "Adding quantity discount: threshold {}, rate {}",
            params.threshold, params.rate
        );

        let items = sets.I.len();
        let periods = sets.T.len();
        let dc: TiVec<ItemIndex, Vec<Var>> = (items, periods).binary(model, "dc")?.into();
        let wd: TiVec<ItemIndex, Vec<Var>> = (items, periods).cont(model, "wd")?.into();
        model.update()?;

        for (i, t) in iproduct!(&sets.I, &sets.T) {
            let p = sets.position(*t);
            let w = variables.w[*i][p];
            let big_m = parameters.max_order_qty[*i][p];
            model.add_constr(
                &format!("discount_on_{}_{}", **i, t),
                c!(big_m * dc[*i][p] >= w - (params.threshold - 1.0)),
            )?;
            model.add_constr(
                &format!("discount_off_{}_{}", **i, t),
                c!(w >= params.threshold * dc[*i][p]),
            )?;
            model.add_constr(
                &format!("discount_qty_ub_{}_{}", **i, t),
                c!(wd[*i][p] <= w),
            )?;
            model.add_constr(
                &format!("discount_qty_gate_{}_{}", **i, t),
                c!(wd[*i][p] <= big_m * dc[*i][p]),
            )?;
            model.add_constr(
                &format!("discount_qty_lb_{}_{}", **i, t),
                c!(wd[*i][p] >= w - big_m + big_m * dc[*i][p]),
            )?;
        }

        objective.push(
            "quantity_discount",
            iproduct!(&sets.I, &sets.T)
                .map(|(i, t)| {
                    -params.rate * parameters.unit_price[*i] * wd[*i][sets.position(*t)]
                })
                .grb_sum(),
        );
        variables.dc = Some(dc);
        variables.wd = Some(wd);
        Ok(())
    }

    /// Builds the model for the given problem, applies the configured
    /// extensions and solver settings, and runs the solver to a terminal
    /// status. A non-optimal status is an outcome, not an error.
    pub fn solve(
        problem: &Problem,
        config: &ParameterSet,
        settings: &SolverSettings,
    ) -> grb::Result<SolveOutcome> {
        let sets = Sets::new(problem);
        let parameters = Parameters::new(problem, &sets);
        let (mut model, mut variables, mut objective) = Self::build(&sets, &parameters, config)?;

        if let Some(batching) = &config.batching {
            Self::add_transport_batching(&mut model, &mut variables, &sets, batching, &mut objective)?;
        }
        if let Some(discount) = &config.discount {
            Self::add_quantity_discount(
                &mut model,
                &mut variables,
                &sets,
                &parameters,
                discount,
                &mut objective,
            )?;
        }

        debug!("Cost terms: {:?}", objective.term_names());
        objective.apply(&mut model)?;
        settings.apply(&mut model)?;

        info!("Solving the procurement model");
        model.optimize()?;

        let status = model.status()?;
        match status {
            Status::Optimal => {
                let results = ProcurementResults::new(&variables, &model, &sets, &parameters)?;
                info!("Optimal solution with objective {}", results.objective);
                Ok(SolveOutcome::Optimal(results))
            }
            status => {
                info!("Solver finished with status {:?}; no solution extracted", status);
                Self::dump_model(&mut model, status, settings);
                Ok(SolveOutcome::Terminated(status))
            }
        }
    }

    /// Advisory dump of the assembled model for failure diagnosis.
    fn dump_model(model: &mut Model, status: Status, settings: &SolverSettings) {
        let path = match settings.write_model_to.as_ref().and_then(|p| p.to_str()) {
            Some(path) => path,
            None => return,
        };
        if matches!(status, Status::Infeasible | Status::InfOrUnbd) {
            if let Err(e) = model.compute_iis() {
                warn!("could not compute an IIS: {}", e);
            }
        }
        match model.write(path) {
            Ok(()) => info!("Model dumped to {}", path),
            Err(e) => warn!("could not write model dump to {}: {}", path, e),
        }
    }
}

/// Terminal result of one solve invocation.
#[derive(Debug)]
pub enum SolveOutcome {
    /// Solved to optimality; the solution has been copied out of the solver
    Optimal(ProcurementResults),
    /// Any other terminal status. No output is produced
    Terminated(Status),
}

impl SolveOutcome {
    pub fn results(&self) -> Option<&ProcurementResults> {
        match self {
            SolveOutcome::Optimal(results) => Some(results),
            SolveOutcome::Terminated(_) => None,
        }
    }
}

/// Solved variable values, detached from the model so that solver state
/// can be torn down before extraction.
#[derive(Debug, Clone)]
pub struct ProcurementResults {
    /// Item keys, aligned with the variable indices
    pub item_ids: TiVec<ItemIndex, String>,
    /// Period labels, aligned with the per-period vectors
    pub periods: Vec<Period>,
    /// Acquired quantities, indexed `[i][position(t)]`
    pub w: TiVec<ItemIndex, Vec<f64>>,
    /// Transferred quantities, indexed `[i][position(t)]`
    pub x: TiVec<ItemIndex, Vec<f64>>,
    /// Upstream inventories over the extended period set
    pub yp: TiVec<ItemIndex, Vec<f64>>,
    /// Downstream inventories over the extended period set
    pub yg: TiVec<ItemIndex, Vec<f64>>,
    /// Batch counts per period, when the batching extension was active
    pub n: Option<Vec<f64>>,
    /// Objective value reported by the solver
    pub objective: f64,
}

impl ProcurementResults {
    pub fn new(
        variables: &Variables,
        model: &Model,
        sets: &Sets,
        parameters: &Parameters,
    ) -> grb::Result<ProcurementResults> {
        fn grid(
            vars: &TiVec<ItemIndex, Vec<Var>>,
            model: &Model,
        ) -> grb::Result<TiVec<ItemIndex, Vec<f64>>> {
            Ok(vars.raw.extract_values(model)?.into())
        }

        Ok(ProcurementResults {
            item_ids: parameters.item_ids.clone(),
            periods: sets.T.clone(),
            w: grid(&variables.w, model)?,
            x: grid(&variables.x, model)?,
            yp: grid(&variables.yp, model)?,
            yg: grid(&variables.yg, model)?,
            n: variables
                .n
                .as_ref()
                .map(|n| n.extract_values(model))
                .transpose()?,
            objective: model.get_attr(attr::ObjVal)?,
        })
    }
}
