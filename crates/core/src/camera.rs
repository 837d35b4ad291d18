//! Camera model registry and parameter validation.
//!
//! Every invocation that registers new images must name one of the models
//! below. Parameter strings are comma-separated numeric lists; an empty
//! string is always valid and defers parameter estimation to the
//! reconstruction stage.

use crate::error::CoreError;

/// The closed set of supported camera models.
///
/// Numeric ids are stable and persisted by the feature store, so the order of
/// the variants must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CameraModel {
    SimplePinhole,
    Pinhole,
    SimpleRadial,
    Radial,
    OpenCv,
    OpenCvFisheye,
    FullOpenCv,
    Fov,
    SimpleRadialFisheye,
    RadialFisheye,
    ThinPrismFisheye,
}

impl CameraModel {
    /// All registered models, in id order.
    pub const ALL: &'static [CameraModel] = &[
        Self::SimplePinhole,
        Self::Pinhole,
        Self::SimpleRadial,
        Self::Radial,
        Self::OpenCv,
        Self::OpenCvFisheye,
        Self::FullOpenCv,
        Self::Fov,
        Self::SimpleRadialFisheye,
        Self::RadialFisheye,
        Self::ThinPrismFisheye,
    ];

    /// Look up a model by its registry name (e.g. `"SIMPLE_RADIAL"`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// The registry name of this model.
    pub fn name(self) -> &'static str {
        match self {
            Self::SimplePinhole => "SIMPLE_PINHOLE",
            Self::Pinhole => "PINHOLE",
            Self::SimpleRadial => "SIMPLE_RADIAL",
            Self::Radial => "RADIAL",
            Self::OpenCv => "OPENCV",
            Self::OpenCvFisheye => "OPENCV_FISHEYE",
            Self::FullOpenCv => "FULL_OPENCV",
            Self::Fov => "FOV",
            Self::SimpleRadialFisheye => "SIMPLE_RADIAL_FISHEYE",
            Self::RadialFisheye => "RADIAL_FISHEYE",
            Self::ThinPrismFisheye => "THIN_PRISM_FISHEYE",
        }
    }

    /// The numeric id persisted alongside registered images.
    pub fn id(self) -> i32 {
        match self {
            Self::SimplePinhole => 0,
            Self::Pinhole => 1,
            Self::SimpleRadial => 2,
            Self::Radial => 3,
            Self::OpenCv => 4,
            Self::OpenCvFisheye => 5,
            Self::FullOpenCv => 6,
            Self::Fov => 7,
            Self::SimpleRadialFisheye => 8,
            Self::RadialFisheye => 9,
            Self::ThinPrismFisheye => 10,
        }
    }

    /// Expected number of parameters for this model.
    pub fn num_params(self) -> usize {
        match self {
            Self::SimplePinhole => 3,
            Self::Pinhole => 4,
            Self::SimpleRadial | Self::SimpleRadialFisheye => 4,
            Self::Radial | Self::RadialFisheye | Self::Fov => 5,
            Self::OpenCv | Self::OpenCvFisheye => 8,
            Self::FullOpenCv | Self::ThinPrismFisheye => 12,
        }
    }

    /// Number of leading focal-length terms in the parameter vector.
    ///
    /// Single-focal models store `f, cx, cy, ...`; the rest store
    /// `fx, fy, cx, cy, ...`.
    pub fn num_focal_params(self) -> usize {
        match self {
            Self::SimplePinhole
            | Self::SimpleRadial
            | Self::Radial
            | Self::SimpleRadialFisheye
            | Self::RadialFisheye => 1,
            _ => 2,
        }
    }

    /// Check a parsed parameter vector against this model.
    ///
    /// An empty vector is always valid (parameters will be estimated later).
    /// A non-empty vector must have exactly `num_params` entries, every entry
    /// must be finite, and the focal terms must be positive.
    pub fn verify_params(self, params: &[f64]) -> bool {
        if params.is_empty() {
            return true;
        }
        if params.len() != self.num_params() {
            return false;
        }
        if params.iter().any(|p| !p.is_finite()) {
            return false;
        }
        params[..self.num_focal_params()].iter().all(|f| *f > 0.0)
    }
}

impl std::fmt::Display for CameraModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `name` refers to a registered camera model.
pub fn camera_model_exists(name: &str) -> bool {
    CameraModel::from_name(name).is_some()
}

/// Parse a comma-separated numeric parameter string.
///
/// An empty (or all-whitespace) string parses to an empty vector. Any token
/// that is not a finite-formattable number is a configuration error.
pub fn csv_to_params(csv: &str) -> Result<Vec<f64>, CoreError> {
    if csv.trim().is_empty() {
        return Ok(Vec::new());
    }
    csv.split(',')
        .map(|token| {
            let token = token.trim();
            token
                .parse::<f64>()
                .map_err(|_| CoreError::InvalidCameraParams(format!("not a number: {token:?}")))
        })
        .collect()
}

/// The validation gate run before any worker is constructed.
///
/// Fails if the model name is unknown or a non-empty parameter string does
/// not satisfy the model's arity and range constraints.
pub fn validate_camera_config(model_name: &str, params_csv: &str) -> Result<(), CoreError> {
    let model = CameraModel::from_name(model_name)
        .ok_or_else(|| CoreError::UnknownCameraModel(model_name.to_string()))?;

    let params = csv_to_params(params_csv)?;
    if !model.verify_params(&params) {
        return Err(CoreError::InvalidCameraParams(format!(
            "model {} expects {} parameters, got {}",
            model.name(),
            model.num_params(),
            params.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn from_name_roundtrips_for_all_models() {
        for model in CameraModel::ALL {
            assert_eq!(CameraModel::from_name(model.name()), Some(*model));
        }
    }

    #[test]
    fn ids_are_positional() {
        assert_eq!(CameraModel::SimplePinhole.id(), 0);
        assert_eq!(CameraModel::ThinPrismFisheye.id(), 10);
    }

    #[test]
    fn unknown_model_does_not_exist() {
        assert!(!camera_model_exists("NOT_A_MODEL"));
        assert!(camera_model_exists("PINHOLE"));
    }

    #[test]
    fn csv_empty_string_parses_to_empty() {
        assert!(csv_to_params("").unwrap().is_empty());
        assert!(csv_to_params("   ").unwrap().is_empty());
    }

    #[test]
    fn csv_parses_numbers_with_whitespace() {
        let params = csv_to_params("1100.0, 512, 384").unwrap();
        assert_eq!(params, vec![1100.0, 512.0, 384.0]);
    }

    #[test]
    fn csv_rejects_junk() {
        assert_matches!(
            csv_to_params("1100.0,abc"),
            Err(CoreError::InvalidCameraParams(_))
        );
    }

    #[test]
    fn empty_params_always_valid() {
        for model in CameraModel::ALL {
            assert!(model.verify_params(&[]));
        }
    }

    #[test]
    fn arity_mismatch_fails_for_every_model() {
        for model in CameraModel::ALL {
            let wrong = vec![1.0; model.num_params() + 1];
            assert!(!model.verify_params(&wrong));
        }
    }

    #[test]
    fn correct_arity_with_positive_focals_passes() {
        let params = vec![1100.0, 512.0, 384.0, 0.01];
        assert!(CameraModel::SimpleRadial.verify_params(&params));
    }

    #[test]
    fn non_positive_focal_fails() {
        assert!(!CameraModel::SimplePinhole.verify_params(&[0.0, 512.0, 384.0]));
        assert!(!CameraModel::Pinhole.verify_params(&[1100.0, -1.0, 512.0, 384.0]));
    }

    #[test]
    fn non_finite_params_fail() {
        assert!(!CameraModel::SimplePinhole.verify_params(&[f64::NAN, 512.0, 384.0]));
    }

    #[test]
    fn validate_camera_config_gates_unknown_model() {
        assert_matches!(
            validate_camera_config("NOT_A_MODEL", ""),
            Err(CoreError::UnknownCameraModel(_))
        );
    }

    #[test]
    fn validate_camera_config_accepts_empty_params() {
        assert!(validate_camera_config("SIMPLE_RADIAL", "").is_ok());
    }

    #[test]
    fn validate_camera_config_rejects_wrong_count() {
        assert_matches!(
            validate_camera_config("SIMPLE_PINHOLE", "1100.0,512.0"),
            Err(CoreError::InvalidCameraParams(_))
        );
    }
}
