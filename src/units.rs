use crate::error::FdfdError;

/// Physical constants scaled to a chosen unit length.
///
/// All spatial quantities handed to the solver (cell size, wavelengths) are
/// expressed in multiples of `l0` meters. The vacuum constants are folded
/// together with `l0` when building operators, so several simulations with
/// different unit scalings can coexist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Units {
    /// Unit length in meters (default: 1 micron).
    pub l0: f64,
}

impl Units {
    /// Vacuum permittivity, F/m.
    pub const EPSILON_0: f64 = 8.854187817e-12;
    /// Vacuum permeability, H/m.
    pub const MU_0: f64 = 1.2566370614e-6;
    /// Speed of light, m/s.
    pub const C_0: f64 = 299_792_458.0;
    /// Impedance of free space, Ohm.
    pub const ETA_0: f64 = 376.730313668;

    pub fn new(l0: f64) -> Result<Self, FdfdError> {
        if !(l0 > 0.0) || !l0.is_finite() {
            return Err(FdfdError::InvalidParameter(format!(
                "unit length must be positive and finite, got {l0}"
            )));
        }
        Ok(Self { l0 })
    }

    /// Permittivity scaled by the unit length, as it enters the operator.
    pub fn epsilon_0(&self) -> f64 {
        Self::EPSILON_0 * self.l0
    }

    /// Permeability scaled by the unit length.
    pub fn mu_0(&self) -> f64 {
        Self::MU_0 * self.l0
    }

    /// Angular frequency for a vacuum wavelength given in `l0` units.
    pub fn omega_for_wavelength(&self, lambda: f64) -> f64 {
        2.0 * std::f64::consts::PI * Self::C_0 / (lambda * self.l0)
    }
}

impl Default for Units {
    fn default() -> Self {
        Self { l0: 1e-6 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonpositive_unit_length() {
        assert!(Units::new(0.0).is_err());
        assert!(Units::new(-1e-6).is_err());
        assert!(Units::new(1e-6).is_ok());
    }

    #[test]
    fn wavelength_to_omega() {
        let units = Units::default();
        // 1550 nm -> about 1.216e15 rad/s
        let omega = units.omega_for_wavelength(1.55);
        assert!((omega - 1.2153e15).abs() / omega < 1e-3);
    }
}
