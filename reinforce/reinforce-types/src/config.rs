//! Configuration types for reinforcement.
//!
//! [`ReinforceConfig`] is built once, validated, and handed to the
//! reinforcement manager; every component borrows it. Settings persist as
//! camelCase JSON through `serde_json`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{HOST_ANGULAR_SPRING, HOST_JOINT_FORCE, JointDrive, ReinforceError};

/// Highest extra joint level; also the only level running parent-skip bridging.
pub const MAX_EXTRA_LEVEL: u8 = 3;

/// Drive and break parameters of synthesized stabilizing joints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtraJointParams {
    /// Linear drive on all three axes.
    pub linear: JointDrive,
    /// Angular drive on all three axes.
    pub angular: JointDrive,
    /// Break force.
    pub breaking_force: f64,
    /// Break torque.
    pub breaking_torque: f64,
}

impl Default for ExtraJointParams {
    fn default() -> Self {
        Self::for_level(1)
    }
}

impl ExtraJointParams {
    /// Stock parameters for an extra joint level.
    ///
    /// Level 1 adds weak joints that only dampen wobbling, level 2 strong
    /// ones, level 3 joints stiff enough to remove all relative motion.
    /// Level 0 (off) returns the level 1 values.
    #[must_use]
    pub fn for_level(level: u8) -> Self {
        let (max_force, angular_spring) = match level {
            0 | 1 => (10.0, HOST_ANGULAR_SPRING),
            2 => (HOST_JOINT_FORCE, HOST_ANGULAR_SPRING),
            _ => (HOST_JOINT_FORCE, HOST_JOINT_FORCE),
        };
        Self {
            linear: JointDrive::new(max_force, HOST_JOINT_FORCE, 0.0),
            angular: JointDrive::new(max_force, angular_spring, 0.0),
            breaking_force: f64::MAX,
            breaking_torque: f64::MAX,
        }
    }
}

/// Main configuration for reinforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReinforceConfig {
    /// Retune primary joints from geometry and mass.
    pub reinforce_attach_nodes: bool,
    /// Detect and bridge mass inversions.
    pub reinforce_inversions: bool,
    /// Bridge launch clamps to the body they hold.
    pub reinforce_launch_clamps: bool,
    /// Extra joint level: 0 = off, 1 = light, 2 = strong, 3 = rigid plus parent-skip.
    pub extra_level: u8,
    /// Scale footprints as volumes (exponent 1.5) instead of areas.
    pub use_volume_not_area: bool,
    /// Bodies lighter than this (dry plus resources) are left alone.
    pub mass_for_adjustment: f64,
    /// Angular spring per unit of moment of inertia.
    pub angular_drive_spring: f64,
    /// Angular damper per unit of moment of inertia (applied at one tenth).
    pub angular_drive_damper: f64,
    /// Multiplier on the stock break force.
    pub break_force_multiplier: f64,
    /// Multiplier on the stock break torque.
    pub break_torque_multiplier: f64,
    /// Break force per square meter of footprint.
    pub break_strength_per_area: f64,
    /// Break torque per unit of moment of inertia.
    #[serde(rename = "breakTorquePerMOI")]
    pub break_torque_per_moi: f64,
    /// A body heavier than an ancestor times this factor is inverted.
    pub inversion_mass_factor: f64,
    /// An anchor this many times lighter than the body still resolves it.
    pub solution_mass_factor: f64,
    /// Mass ratio within which parent-skip bridging stops walking up.
    pub parent_skip_mass_ratio: f64,
    /// Trust the contact-area strength only when it lies within
    /// [`Self::contact_area_strength_band`] of the geometric estimate.
    pub cross_check_contact_area: bool,
    /// Relative band for [`Self::cross_check_contact_area`].
    pub contact_area_strength_band: f64,
    /// Parameters of synthesized stabilizing joints.
    pub extra_joint: ExtraJointParams,
    /// Verbose per-tree diagnostics.
    pub debug: bool,
}

impl Default for ReinforceConfig {
    fn default() -> Self {
        Self {
            reinforce_attach_nodes: true,
            reinforce_inversions: true,
            reinforce_launch_clamps: false,
            extra_level: 1,
            use_volume_not_area: true,
            mass_for_adjustment: 0.01,
            angular_drive_spring: 5e12,
            angular_drive_damper: 25.0,
            break_force_multiplier: 4.0,
            break_torque_multiplier: 4.0,
            break_strength_per_area: 1500.0,
            break_torque_per_moi: 6000.0,
            inversion_mass_factor: 2.0,
            solution_mass_factor: 2.0,
            parent_skip_mass_ratio: 5.0,
            cross_check_contact_area: false,
            contact_area_strength_band: 0.1,
            extra_joint: ExtraJointParams::for_level(1),
            debug: false,
        }
    }
}

impl ReinforceConfig {
    /// Easy difficulty: strong extra joints.
    #[must_use]
    pub fn easy() -> Self {
        Self::default().extra_level(2)
    }

    /// Normal difficulty: light extra joints.
    #[must_use]
    pub fn normal() -> Self {
        Self::default()
    }

    /// Moderate difficulty: no extra joints.
    #[must_use]
    pub fn moderate() -> Self {
        Self::default().extra_level(0)
    }

    /// Hard difficulty: no extra joints.
    #[must_use]
    pub fn hard() -> Self {
        Self::default().extra_level(0)
    }

    /// Set the extra joint level and load its stock joint parameters.
    #[must_use]
    pub fn extra_level(mut self, level: u8) -> Self {
        self.extra_level = level;
        self.extra_joint = ExtraJointParams::for_level(level);
        self
    }

    /// Set the extra joint parameters, keeping the level.
    #[must_use]
    pub fn extra_joint(mut self, params: ExtraJointParams) -> Self {
        self.extra_joint = params;
        self
    }

    /// Enable or disable primary joint reinforcement.
    #[must_use]
    pub fn reinforce_attach_nodes(mut self, enabled: bool) -> Self {
        self.reinforce_attach_nodes = enabled;
        self
    }

    /// Enable or disable inversion resolution.
    #[must_use]
    pub fn reinforce_inversions(mut self, enabled: bool) -> Self {
        self.reinforce_inversions = enabled;
        self
    }

    /// Enable or disable launch clamp bridging.
    #[must_use]
    pub fn reinforce_launch_clamps(mut self, enabled: bool) -> Self {
        self.reinforce_launch_clamps = enabled;
        self
    }

    /// Scale footprints as areas instead of volumes.
    #[must_use]
    pub fn use_area(mut self) -> Self {
        self.use_volume_not_area = false;
        self
    }

    /// Cross-check contact-area strength against the geometric estimate.
    #[must_use]
    pub fn cross_check_contact_area(mut self, enabled: bool) -> Self {
        self.cross_check_contact_area = enabled;
        self
    }

    /// Set the inversion and solution mass factors.
    #[must_use]
    pub fn mass_factors(mut self, inversion: f64, solution: f64) -> Self {
        self.inversion_mass_factor = inversion;
        self.solution_mass_factor = solution;
        self
    }

    /// Enable verbose diagnostics.
    #[must_use]
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Whether any extra joints are built.
    #[must_use]
    pub fn extra_joints_enabled(&self) -> bool {
        self.extra_level >= 1
    }

    /// Whether parent-skip bridging runs.
    #[must_use]
    pub fn parent_skip_enabled(&self) -> bool {
        self.extra_level >= MAX_EXTRA_LEVEL
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.extra_level > MAX_EXTRA_LEVEL {
            return Err(ReinforceError::invalid_config(format!(
                "extra_level must be at most {MAX_EXTRA_LEVEL}, got {}",
                self.extra_level
            )));
        }

        let factors = [
            ("mass_for_adjustment", self.mass_for_adjustment),
            ("angular_drive_spring", self.angular_drive_spring),
            ("angular_drive_damper", self.angular_drive_damper),
            ("break_force_multiplier", self.break_force_multiplier),
            ("break_torque_multiplier", self.break_torque_multiplier),
            ("break_strength_per_area", self.break_strength_per_area),
            ("break_torque_per_moi", self.break_torque_per_moi),
            ("contact_area_strength_band", self.contact_area_strength_band),
        ];
        for (name, value) in factors {
            if !value.is_finite() || value < 0.0 {
                return Err(ReinforceError::invalid_config(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }

        let ratios = [
            ("inversion_mass_factor", self.inversion_mass_factor),
            ("solution_mass_factor", self.solution_mass_factor),
            ("parent_skip_mass_ratio", self.parent_skip_mass_ratio),
        ];
        for (name, value) in ratios {
            if !value.is_finite() || value <= 0.0 {
                return Err(ReinforceError::invalid_config(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }

        let extra = &self.extra_joint;
        let drives = [extra.linear, extra.angular];
        if drives
            .iter()
            .any(|d| d.max_force < 0.0 || d.spring < 0.0 || d.damper < 0.0)
            || extra.breaking_force < 0.0
            || extra.breaking_torque < 0.0
        {
            return Err(ReinforceError::invalid_config(
                "extra joint parameters cannot be negative",
            ));
        }

        Ok(())
    }

    /// Read persisted settings from JSON.
    ///
    /// Keys are camelCase and absent keys keep their defaults. The stock
    /// parameters of `extraLevel` apply to the extra joint, with any fields
    /// of an `extraJoint` object laid over them. The result is validated.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;

        let level = value
            .get("extraLevel")
            .and_then(serde_json::Value::as_u64)
            .and_then(|level| u8::try_from(level).ok())
            .unwrap_or(Self::default().extra_level);
        let mut extra_joint = serde_json::to_value(ExtraJointParams::for_level(level))?;
        if let (Some(stock), Some(overrides)) = (
            extra_joint.as_object_mut(),
            value.get("extraJoint").and_then(serde_json::Value::as_object),
        ) {
            for (key, field) in overrides {
                stock.insert(key.clone(), field.clone());
            }
        }
        if let Some(settings) = value.as_object_mut() {
            settings.insert("extraJoint".to_owned(), extra_joint);
        }

        let config: Self = serde_json::from_value(value)?;
        config.validate()?;

        debug!(extra_level = config.extra_level, "settings loaded");
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(ReinforceError::from)
    }
}
