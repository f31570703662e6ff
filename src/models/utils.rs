use std::ops::Range;

use grb::prelude::*;

/// Declares whole families of decision variables in one call, named
/// `base_0`, `base_1`, ... / `base_i_t` for grids.
pub trait AddVars {
    type Out;

    fn vars(
        &self,
        model: &mut Model,
        base_name: &str,
        vtype: VarType,
        bounds: &Range<f64>,
    ) -> grb::Result<Self::Out>;

    /// Binary variables
    fn binary(&self, model: &mut Model, base_name: &str) -> grb::Result<Self::Out> {
        self.vars(model, base_name, VarType::Binary, &(0.0..1.0))
    }

    /// Nonnegative integer variables
    fn integer(&self, model: &mut Model, base_name: &str) -> grb::Result<Self::Out> {
        self.vars(model, base_name, VarType::Integer, &(0.0..f64::INFINITY))
    }

    /// Nonnegative continuous variables
    fn cont(&self, model: &mut Model, base_name: &str) -> grb::Result<Self::Out> {
        self.vars(model, base_name, VarType::Continuous, &(0.0..f64::INFINITY))
    }
}

impl AddVars for usize {
    type Out = Vec<Var>;

    fn vars(
        &self,
        model: &mut Model,
        base_name: &str,
        vtype: VarType,
        bounds: &Range<f64>,
    ) -> grb::Result<Self::Out> {
        (0..*self)
            .map(|i| {
                model.add_var(
                    &format!("{}_{}", base_name, i),
                    vtype,
                    0.0,
                    bounds.start,
                    bounds.end,
                    std::iter::empty(),
                )
            })
            .collect()
    }
}

impl AddVars for (usize, usize) {
    type Out = Vec<Vec<Var>>;

    fn vars(
        &self,
        model: &mut Model,
        base_name: &str,
        vtype: VarType,
        bounds: &Range<f64>,
    ) -> grb::Result<Self::Out> {
        (0..self.0)
            .map(|i| {
                self.1
                    .vars(model, &format!("{}_{}", base_name, i), vtype, bounds)
            })
            .collect()
    }
}

/// Reads solved variable values out of an optimized model.
pub trait ExtractValues {
    type Out;

    fn extract_values(&self, model: &Model) -> grb::Result<Self::Out>;
}

impl ExtractValues for Var {
    type Out = f64;

    fn extract_values(&self, model: &Model) -> grb::Result<f64> {
        model.get_obj_attr(attr::X, self)
    }
}

impl<T: ExtractValues> ExtractValues for Vec<T> {
    type Out = Vec<T::Out>;

    fn extract_values(&self, model: &Model) -> grb::Result<Self::Out> {
        self.iter().map(|e| e.extract_values(model)).collect()
    }
}
