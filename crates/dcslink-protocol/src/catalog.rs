//! The static API catalog: every remote call the client knows how to make.
//!
//! A catalog is built once and never mutated. [`Catalog::builtin`] is the
//! table of calls exposed by the DCS export script; custom tables can be
//! loaded with [`Catalog::from_descriptors`] or [`Catalog::from_json`].

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Version of the built-in table. Bumped whenever an entry changes.
pub const CATALOG_VERSION: u32 = 1;

/// Id of `LoGetObjectById(object_id)`.
pub const API_OBJECT_BY_ID: u32 = 10;
/// Id of `LoGetSelfData()`.
pub const API_SELF_DATA: u32 = 17;
/// Id of `LoGetWorldObjects()`, the "get all objects" call.
pub const API_WORLD_OBJECTS: u32 = 52;

// ---------------------------------------------------------------------------
// Descriptor types
// ---------------------------------------------------------------------------

/// The kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamKind {
    /// Integer or floating-point number.
    Number,
    /// Text, rendered quoted.
    String,
}

impl ParamKind {
    /// Numeric code used by the JSON transport record.
    pub fn code(self) -> u8 {
        match self {
            Self::Number => 0,
            Self::String => 1,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Number => "NUMBER",
            Self::String => "STRING",
        })
    }
}

/// One declared parameter of an API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Position of the parameter in the call, starting at 0.
    pub id: u32,
    /// Name used in the call-syntax template and by callers.
    pub name: String,
    /// Accepted value kind.
    pub kind: ParamKind,
    /// Whether the argument may be left out of the call.
    #[serde(default)]
    pub optional: bool,
}

/// An immutable catalog entry describing one remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDescriptor {
    /// Unique id.
    pub id: u32,
    /// Call-syntax template, e.g. `LoGetObjectById(object_id)`.
    pub syntax: String,
    /// Declared number of parameters. Always equals `parameters.len()`
    /// in a validated catalog.
    pub parameter_count: usize,
    /// Parameters in call order.
    pub parameters: Vec<ParameterSpec>,
    /// Whether the server answers this call with data.
    pub returns_data: bool,
    /// Informational result kind.
    pub result_kind: String,
}

impl ApiDescriptor {
    /// Looks up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl fmt::Display for ApiDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.syntax)
    }
}

/// Serialized catalog entry. Accepts both the camelCase schema and the
/// snake_case field names used by the export script's own table.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorDef {
    id: u32,
    #[serde(alias = "api_syntax")]
    syntax: String,
    #[serde(default, alias = "parameter_count")]
    parameter_count: Option<usize>,
    #[serde(default, alias = "parameter_defs")]
    parameters: Vec<ParameterSpec>,
    #[serde(alias = "returns_data")]
    returns_data: bool,
    #[serde(default = "default_result_kind", alias = "result_type")]
    result_kind: String,
}

fn default_result_kind() -> String {
    "nil".to_string()
}

impl From<DescriptorDef> for ApiDescriptor {
    fn from(def: DescriptorDef) -> Self {
        Self {
            id: def.id,
            parameter_count: def.parameter_count.unwrap_or(def.parameters.len()),
            syntax: def.syntax,
            parameters: def.parameters,
            returns_data: def.returns_data,
            result_kind: def.result_kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// An immutable, ordered set of [`ApiDescriptor`]s.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<ApiDescriptor>,
}

impl Catalog {
    /// The built-in DCS export table, built on first use.
    pub fn builtin() -> &'static Catalog {
        static BUILTIN: OnceLock<Catalog> = OnceLock::new();
        BUILTIN.get_or_init(|| Catalog {
            entries: BUILTIN_TABLE.iter().map(builtin_descriptor).collect(),
        })
    }

    /// Builds a catalog from descriptors, keeping their order.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidCatalog`] if ids repeat, a declared
    /// parameter count disagrees with the parameter list, or a
    /// descriptor repeats a parameter name.
    pub fn from_descriptors(
        entries: Vec<ApiDescriptor>,
    ) -> Result<Self, ProtocolError> {
        let mut ids = HashSet::new();
        for api in &entries {
            if !ids.insert(api.id) {
                return Err(ProtocolError::InvalidCatalog(format!(
                    "duplicate API id {}",
                    api.id
                )));
            }
            if api.parameter_count != api.parameters.len() {
                return Err(ProtocolError::InvalidCatalog(format!(
                    "API {} declares {} parameters but lists {}",
                    api.id,
                    api.parameter_count,
                    api.parameters.len()
                )));
            }
            let mut names = HashSet::new();
            if let Some(dup) =
                api.parameters.iter().find(|p| !names.insert(p.name.as_str()))
            {
                return Err(ProtocolError::InvalidCatalog(format!(
                    "API {} repeats parameter `{}`",
                    api.id, dup.name
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Loads a catalog from a JSON array of descriptors.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] for malformed JSON, otherwise the same
    /// validation errors as [`Catalog::from_descriptors`].
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let defs: Vec<DescriptorDef> =
            serde_json::from_str(json).map_err(ProtocolError::decode)?;
        Self::from_descriptors(defs.into_iter().map(Into::into).collect())
    }

    /// Looks up a descriptor by id.
    pub fn get(&self, id: u32) -> Option<&ApiDescriptor> {
        self.entries.iter().find(|api| api.id == id)
    }

    /// Looks up a descriptor by its exact call syntax.
    pub fn find_by_syntax(&self, syntax: &str) -> Option<&ApiDescriptor> {
        self.entries.iter().find(|api| api.syntax == syntax)
    }

    /// All descriptors whose syntax contains `pattern` (case-sensitive),
    /// in declaration order.
    pub fn matching(&self, pattern: &str) -> Vec<&ApiDescriptor> {
        self.entries
            .iter()
            .filter(|api| api.syntax.contains(pattern))
            .collect()
    }

    /// Iterates over every descriptor in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ApiDescriptor> {
        self.entries.iter()
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built-in table
// ---------------------------------------------------------------------------

/// `(id, returns_data, syntax, parameter_count, parameter names)`.
/// Every built-in parameter is a required number.
type BuiltinEntry = (u32, bool, &'static str, usize, &'static [&'static str]);

fn builtin_descriptor(entry: &BuiltinEntry) -> ApiDescriptor {
    let (id, returns_data, syntax, parameter_count, names) = *entry;
    ApiDescriptor {
        id,
        syntax: syntax.to_string(),
        parameter_count,
        parameters: names
            .iter()
            .zip(0u32..)
            .map(|(name, position)| ParameterSpec {
                id: position,
                name: (*name).to_string(),
                kind: ParamKind::Number,
                optional: false,
            })
            .collect(),
        returns_data,
        result_kind: default_result_kind(),
    }
}

#[rustfmt::skip]
const BUILTIN_TABLE: &[BuiltinEntry] = &[
    (2, false, "GetDevice(device_id):set_argument_value(argument_id, new_value)", 3,
        &["device_id", "argument_id", "new_value"]),
    (6, true, "GetDevice(device_id):get_frequency()", 1, &["device_id"]),
    (7, false, "GetDevice(device_id):set_frequency(new_value)", 2, &["device_id", "new_value"]),
    (8, true, "GetDevice(device_id):update_arguments()", 1, &["device_id"]),
    (9, true, "LoGetAircraftDrawArgumentValue(draw_argument_id)", 1, &["draw_argument_id"]),
    (10, true, "LoGetObjectById(object_id)", 1, &["object_id"]),
    (11, true, "list_indication(indicator_id)", 1, &["indicator_id"]),
    (12, false, "LoSetCommand(iCommand)", 1, &["iCommand"]),
    (13, false, "LoSetCommand(iCommand, new_value)", 2, &["iCommand", "new_value"]),
    (14, false, "LoGeoCoordinatesToLoCoordinates(longitude_degrees, latitude_degrees)", 2,
        &["longitude_degrees", "latitude_degrees"]),
    (15, false, "LoCoordinatesToGeoCoordinates(x, z)", 2, &["x", "z"]),
    (16, true, "list_cockpit_params()", 0, &[]),
    (17, true, "LoGetSelfData()", 0, &[]),
    (18, true, "LoGetModelTime()", 0, &[]),
    (19, true, "LoGetMissionStartTime()", 0, &[]),
    (20, true, "LoGetPilotName()", 0, &[]),
    (21, true, "LoGetIndicatedAirSpeed()", 0, &[]),
    (22, true, "LoGetAccelerationUnits()", 0, &[]),
    (23, true, "LoGetADIPitchBankYaw()", 0, &[]),
    (24, true, "LoGetSnares()", 0, &[]),
    (25, true, "LoGetAltitudeAboveSeaLevel()", 0, &[]),
    (26, true, "LoGetAltitudeAboveGroundLevel()", 0, &[]),
    (27, true, "LoGetVerticalVelocity()", 0, &[]),
    (28, true, "LoGetTrueAirSpeed()", 0, &[]),
    (29, true, "LoGetMachNumber()", 0, &[]),
    (30, true, "LoGetAngleOfAttack()", 0, &[]),
    (31, true, "LoGetGlideDeviation()", 0, &[]),
    (32, true, "LoGetSideDeviation()", 0, &[]),
    (33, true, "LoGetSlipBallPosition()", 0, &[]),
    (34, true, "LoGetEngineInfo()", 0, &[]),
    (35, true, "LoGetMechInfo()", 0, &[]),
    (36, true, "LoGetControlPanel_HSI()", 0, &[]),
    (37, true, "LoGetPayloadInfo()", 0, &[]),
    (38, true, "LoGetNavigationInfo()", 0, &[]),
    (39, true, "LoGetMagneticYaw()", 0, &[]),
    (40, true, "LoGetBasicAtmospherePressure()", 0, &[]),
    (41, true, "LoGetMCPState()", 0, &[]),
    (42, true, "LoGetTWSInfo()", 0, &[]),
    (43, true, "LoGetAngleOfSideSlip()", 0, &[]),
    (44, true, "LoGetRadarAltimeter()", 0, &[]),
    (45, true, "LoGetRoute()", 0, &[]),
    (46, true, "LoGetWingInfo()", 0, &[]),
    (47, true, "LoGetRadioBeaconsStatus()", 0, &[]),
    (48, true, "LoGetVectorVelocity()", 0, &[]),
    (49, true, "LoGetVectorWindVelocity()", 0, &[]),
    (50, true, "LoGetAngularVelocity()", 0, &[]),
    (51, true, "LoGetFMData()", 0, &[]),
    (52, true, "LoGetWorldObjects()", 0, &[]),
    (53, true, "LoGetTargetInformation()", 0, &[]),
    (54, true, "LoGetLockedTargetInformation()", 0, &[]),
    (55, true, "LoGetF15_TWS_Contacts()", 0, &[]),
    (56, true, "LoGetSightingSystemInfo()", 0, &[]),
    (57, true, "LoGetWingTargets()", 0, &[]),
    (58, true, "LoGetAltitude()", 0, &[]),
    (59, true, "LoIsOwnshipExportAllowed()", 0, &[]),
    (60, true, "LoIsObjectExportAllowed()", 0, &[]),
    (61, true, "LoIsSensorExportAllowed()", 0, &[]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_valid() {
        let builtin = Catalog::builtin();
        let rebuilt = Catalog::from_descriptors(builtin.iter().cloned().collect());
        assert!(rebuilt.is_ok(), "{:?}", rebuilt.err());
        assert_eq!(builtin.len(), BUILTIN_TABLE.len());
    }

    #[test]
    fn test_get_world_objects_matches_declared_count() {
        let api = Catalog::builtin().get(API_WORLD_OBJECTS).unwrap();
        assert_eq!(api.syntax, "LoGetWorldObjects()");
        assert_eq!(api.parameters.len(), api.parameter_count);
        assert!(api.returns_data);
    }

    #[test]
    fn test_get_multi_parameter_api() {
        let api = Catalog::builtin().get(2).unwrap();
        assert_eq!(api.parameter_count, 3);
        assert_eq!(api.parameters.len(), 3);
        assert_eq!(api.parameters[2].name, "new_value");
        assert_eq!(api.parameters[2].id, 2);
        assert!(!api.returns_data);
    }

    #[test]
    fn test_unknown_id_is_none() {
        assert!(Catalog::builtin().get(0).is_none());
        assert!(Catalog::builtin().get(9999).is_none());
    }

    #[test]
    fn test_matching_is_case_sensitive_and_ordered() {
        let hits = Catalog::builtin().matching("LoSetCommand");
        let ids: Vec<u32> = hits.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![12, 13]);
        assert!(Catalog::builtin().matching("losetcommand").is_empty());
    }

    #[test]
    fn test_find_by_exact_syntax() {
        let api = Catalog::builtin().find_by_syntax("LoGetSelfData()").unwrap();
        assert_eq!(api.id, API_SELF_DATA);
        assert!(Catalog::builtin().find_by_syntax("LoGetSelfData").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let api = Catalog::builtin().get(17).unwrap().clone();
        let err = Catalog::from_descriptors(vec![api.clone(), api]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidCatalog(_)));
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut api = Catalog::builtin().get(10).unwrap().clone();
        api.parameter_count = 2;
        let err = Catalog::from_descriptors(vec![api]).unwrap_err();
        assert!(err.to_string().contains("declares 2"));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_from_json_accepts_both_schemas() {
        let json = r#"[
            {"id": 1, "syntax": "Echo(text)", "returnsData": true,
             "parameters": [{"id": 0, "name": "text", "kind": "STRING"}],
             "resultKind": "string"},
            {"id": 2, "api_syntax": "Ping()", "returns_data": false,
             "parameter_count": 0, "parameter_defs": []}
        ]"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        let echo = catalog.get(1).unwrap();
        assert_eq!(echo.parameter_count, 1);
        assert_eq!(echo.parameters[0].kind, ParamKind::String);
        assert_eq!(catalog.get(2).unwrap().result_kind, "nil");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            Catalog::from_json("not json"),
            Err(ProtocolError::Decode(_))
        ));
    }
}
