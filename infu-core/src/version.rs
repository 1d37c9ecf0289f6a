use serde::{Deserialize, Serialize};

/// Identity adapter checkpoints shipped for the v1.0 model family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ModelVersion {
    /// Stage 1, tuned for identity similarity.
    #[serde(rename = "sim_stage1")]
    SimStage1,
    /// Stage 2, tuned for text-image alignment and aesthetics.
    #[default]
    #[serde(rename = "aes_stage2")]
    AesStage2,
}

serde_plain::derive_display_from_serialize!(ModelVersion);
serde_plain::derive_fromstr_from_deserialize!(ModelVersion);

impl ModelVersion {
    pub const ALL: [ModelVersion; 2] = [ModelVersion::SimStage1, ModelVersion::AesStage2];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVersion::SimStage1 => "sim_stage1",
            ModelVersion::AesStage2 => "aes_stage2",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_aesthetics_stage() {
        assert_eq!(ModelVersion::default(), ModelVersion::AesStage2);
    }

    #[test]
    fn test_plain_string_forms() {
        for version in ModelVersion::ALL {
            assert_eq!(version.to_string(), version.as_str());
            assert_eq!(version.as_str().parse::<ModelVersion>().unwrap(), version);
        }
        assert!("stage3".parse::<ModelVersion>().is_err());
    }

    #[test]
    fn test_json_form() {
        let json = serde_json::to_string(&ModelVersion::SimStage1).unwrap();
        assert_eq!(json, "\"sim_stage1\"");
    }
}
