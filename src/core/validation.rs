use super::error::{EngineError, Result};
use super::types::{ControlledParameter, OptimizationTarget, ParameterKey, ParameterModel, Tolerance};

fn positive(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::invalid(field, format!("must be > 0 (got {})", value)))
    }
}

fn at_least(field: &str, value: f64, bound: f64) -> Result<()> {
    if value.is_finite() && value >= bound {
        Ok(())
    } else {
        Err(EngineError::invalid(
            field,
            format!("must be >= {} (got {})", bound, value),
        ))
    }
}

/// Check every ParameterModel invariant, reporting the first violation by field path.
pub fn validate_parameters(model: &ParameterModel) -> Result<()> {
    let g = &model.geometry;
    positive("geometry.width", g.width)?;
    positive("geometry.gap", g.gap)?;
    positive("geometry.length", g.length)?;
    positive("geometry.substrate_height", g.substrate_height)?;
    positive("geometry.substrate_width", g.substrate_width)?;
    positive("geometry.metal_thickness", g.metal_thickness)?;
    positive("geometry.air_spacing", g.air_spacing)?;

    let m = &model.material;
    at_least("material.relative_permittivity", m.relative_permittivity, 1.0)?;
    at_least("material.loss_tangent", m.loss_tangent, 0.0)?;
    at_least("material.conductivity", m.conductivity, 0.0)?;

    positive("mesh.resolution", model.mesh.resolution)?;
    positive("mesh.edge_resolution", model.mesh.edge_resolution)?;

    let e = &model.excitation;
    positive("excitation.reference_impedance", e.reference_impedance)?;
    positive("excitation.port_length", e.port_length)?;
    if e.port_length >= g.length {
        return Err(EngineError::invalid(
            "excitation.port_length",
            format!(
                "must be < geometry.length ({} >= {})",
                e.port_length, g.length
            ),
        ));
    }

    let s = &model.sweep;
    positive("sweep.start", s.start)?;
    if !(s.stop.is_finite() && s.stop > s.start) {
        return Err(EngineError::invalid(
            "sweep.stop",
            format!("must be > sweep.start ({} <= {})", s.stop, s.start),
        ));
    }
    if s.points < 2 {
        return Err(EngineError::invalid(
            "sweep.points",
            format!("must be >= 2 (got {})", s.points),
        ));
    }

    Ok(())
}

pub fn validate_target(target: &OptimizationTarget) -> Result<()> {
    if !target.target_value.is_finite() {
        return Err(EngineError::invalid(
            "target.target_value",
            format!("must be finite (got {})", target.target_value),
        ));
    }
    positive("target.tolerance", target.tolerance.raw())?;
    if matches!(target.tolerance, Tolerance::Relative(_)) && target.target_value == 0.0 {
        return Err(EngineError::invalid(
            "target.tolerance",
            "a relative tolerance needs a non-zero target_value",
        ));
    }
    for (i, constraint) in target.constraints.iter().enumerate() {
        if !constraint.bound.is_finite() {
            return Err(EngineError::invalid(
                format!("target.constraints[{}].bound", i),
                "must be finite",
            ));
        }
    }
    Ok(())
}

/// Bounds and steps of the controlled parameters, and the starting point against them.
pub fn validate_controls(controls: &[ControlledParameter], initial: &ParameterModel) -> Result<()> {
    validate_control_bounds(controls)?;
    for control in controls {
        let start = control.key.get(initial);
        if !control.is_within_bounds(start) {
            return Err(EngineError::invalid(
                control.key.field_path(),
                format!(
                    "initial value {} outside [{}, {}]",
                    start, control.min_val, control.max_val
                ),
            ));
        }
    }
    Ok(())
}

/// Bounds and steps alone, without a starting point.
pub fn validate_control_bounds(controls: &[ControlledParameter]) -> Result<()> {
    if controls.is_empty() {
        return Err(EngineError::invalid(
            "optimization.parameters",
            "at least one controlled parameter is required",
        ));
    }
    for (i, control) in controls.iter().enumerate() {
        let field = |name: &str| format!("optimization.parameters[{}].{}", i, name);
        if !(control.min_val.is_finite() && control.max_val.is_finite())
            || control.min_val >= control.max_val
        {
            return Err(EngineError::invalid(
                field("max_val"),
                format!("must exceed min_val ({} >= {})", control.min_val, control.max_val),
            ));
        }
        positive(&field("initial_step"), control.initial_step)?;
        positive(&field("min_step"), control.min_step)?;
        if control.min_step > control.initial_step {
            return Err(EngineError::invalid(
                field("min_step"),
                format!(
                    "must not exceed initial_step ({} > {})",
                    control.min_step, control.initial_step
                ),
            ));
        }

        match control.key {
            ParameterKey::RelativePermittivity => at_least(&field("min_val"), control.min_val, 1.0)?,
            _ => positive(&field("min_val"), control.min_val)?,
        }

        if controls[..i].iter().any(|c| c.key == control.key) {
            return Err(EngineError::invalid(
                field("key"),
                format!("{} is controlled twice", control.key.field_path()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TargetMetric;

    fn field_of(err: EngineError) -> String {
        match err {
            EngineError::InvalidParameter { field, .. } => field,
            other => panic!("expected InvalidParameter, got {other}"),
        }
    }

    #[test]
    fn default_models_are_valid() {
        assert!(validate_parameters(&ParameterModel::default()).is_ok());
    }

    #[test]
    fn non_positive_width_names_the_field() {
        let model = ParameterModel::cpw(-1.0, 6.0);
        let err = validate_parameters(&model).unwrap_err();
        assert_eq!(field_of(err), "geometry.width");
    }

    #[test]
    fn nan_lengths_are_rejected() {
        let mut model = ParameterModel::default();
        model.geometry.substrate_height = f64::NAN;
        assert_eq!(
            field_of(validate_parameters(&model).unwrap_err()),
            "geometry.substrate_height"
        );
    }

    #[test]
    fn sweep_must_be_increasing_with_two_points() {
        let model = ParameterModel::default().with_sweep(20e9, 1e9, 201);
        assert_eq!(field_of(validate_parameters(&model).unwrap_err()), "sweep.stop");

        let model = ParameterModel::default().with_sweep(1e9, 20e9, 1);
        assert_eq!(field_of(validate_parameters(&model).unwrap_err()), "sweep.points");
    }

    #[test]
    fn permittivity_below_vacuum_is_rejected() {
        let mut model = ParameterModel::default();
        model.material.relative_permittivity = 0.5;
        assert_eq!(
            field_of(validate_parameters(&model).unwrap_err()),
            "material.relative_permittivity"
        );
    }

    #[test]
    fn ports_must_fit_inside_the_line() {
        let mut model = ParameterModel::default();
        model.excitation.port_length = model.geometry.length;
        assert_eq!(
            field_of(validate_parameters(&model).unwrap_err()),
            "excitation.port_length"
        );
    }

    #[test]
    fn zero_tolerance_is_rejected() {
        let target = OptimizationTarget::new(
            TargetMetric::CharacteristicImpedance,
            50.0,
            Tolerance::Absolute(0.0),
        );
        assert_eq!(field_of(validate_target(&target).unwrap_err()), "target.tolerance");
    }

    #[test]
    fn relative_tolerance_on_a_zero_target_is_rejected() {
        let target = OptimizationTarget::new(TargetMetric::ReturnLossDb, 0.0, Tolerance::Relative(0.1));
        assert_eq!(field_of(validate_target(&target).unwrap_err()), "target.tolerance");

        let target = OptimizationTarget::new(TargetMetric::ReturnLossDb, 0.0, Tolerance::Absolute(0.5));
        assert!(validate_target(&target).is_ok());
    }

    #[test]
    fn length_controls_need_positive_bounds() {
        let zero_floor = ControlledParameter::new(ParameterKey::Gap, 0.0, 50.0, 1.0);
        assert_eq!(
            field_of(validate_control_bounds(&[zero_floor]).unwrap_err()),
            "optimization.parameters[0].min_val"
        );

        let sub_vacuum = ControlledParameter::new(ParameterKey::RelativePermittivity, 0.5, 12.0, 0.5);
        assert_eq!(
            field_of(validate_control_bounds(&[sub_vacuum]).unwrap_err()),
            "optimization.parameters[0].min_val"
        );

        let ok = ControlledParameter::new(ParameterKey::RelativePermittivity, 1.0, 12.0, 0.5);
        assert!(validate_control_bounds(&[ok]).is_ok());
    }

    #[test]
    fn controls_must_bracket_the_starting_point() {
        let model = ParameterModel::cpw(10.0, 6.0);
        let ok = ControlledParameter::new(ParameterKey::Width, 1.0, 50.0, 2.0);
        assert!(validate_controls(&[ok.clone()], &model).is_ok());

        let outside = ControlledParameter::new(ParameterKey::Width, 20.0, 50.0, 2.0);
        assert_eq!(
            field_of(validate_controls(&[outside], &model).unwrap_err()),
            "geometry.width"
        );

        assert!(validate_controls(&[ok.clone(), ok], &model).is_err());
        assert!(validate_controls(&[], &model).is_err());
    }
}
