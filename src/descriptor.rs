//! Device descriptor XML parsing
//!
//! A device descriptor packet embeds a document of the form:
//!
//! ```xml
//! <device>
//!   <device_name>SampleEnv</device_name>
//!   <process_variables>
//!     <process_variable>
//!       <pv_name>temperature</pv_name>
//!       <pv_id>1</pv_id>
//!       <pv_type>double</pv_type>
//!       <pv_units>K</pv_units>
//!     </process_variable>
//!   </process_variables>
//! </device>
//! ```
//!
//! Variables whose type has no log representation are skipped with a warning.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::xml_utils::sanitize_xml;
use crate::{ListenerError, LogValueType, Result, VariableInfo};

#[derive(Debug, Deserialize)]
struct DeviceXml {
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default)]
    process_variables: Option<ProcessVariablesXml>,
}

#[derive(Debug, Deserialize)]
struct ProcessVariablesXml {
    #[serde(rename = "process_variable", default)]
    variables: Vec<ProcessVariableXml>,
}

#[derive(Debug, Deserialize)]
struct ProcessVariableXml {
    pv_name: String,
    pv_id: u32,
    pv_type: String,
    #[serde(default)]
    pv_units: Option<String>,
}

/// One process variable announced by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedVariable {
    pub variable_id: u32,
    pub info: VariableInfo,
}

/// Parsed device descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub device_id: u32,
    pub device_name: Option<String>,
    pub variables: Vec<DescribedVariable>,
}

impl DeviceDescriptor {
    /// Parse the descriptor XML published for `device_id`.
    pub fn parse(device_id: u32, xml: &str) -> Result<Self> {
        let context = format!("Device descriptor {}", device_id);
        let cleaned = sanitize_xml(xml, &context)?;
        let document: DeviceXml = quick_xml::de::from_str(&cleaned)
            .map_err(|e| ListenerError::parse(context.clone(), e.to_string()))?;

        let mut variables = Vec::new();
        for pv in document.process_variables.map(|p| p.variables).unwrap_or_default() {
            let Some(value_type) = LogValueType::from_pv_type(&pv.pv_type) else {
                warn!(
                    device_id,
                    pv_name = %pv.pv_name,
                    pv_type = %pv.pv_type,
                    "Unsupported process variable type, skipping"
                );
                continue;
            };

            let units = pv.pv_units.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
            variables.push(DescribedVariable {
                variable_id: pv.pv_id,
                info: VariableInfo { name: pv.pv_name.trim().to_string(), value_type, units },
            });
        }

        debug!(
            device_id,
            device_name = ?document.device_name,
            variables = variables.len(),
            "Parsed device descriptor"
        );

        Ok(Self { device_id, device_name: document.device_name, variables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::descriptor_xml;

    #[test]
    fn parses_typed_variables() {
        let xml = descriptor_xml(
            "SampleEnv",
            &[(1, "temperature", "double", "K"), (2, "valve", "enum_ValveState", ""), (3, "label", "string", "")],
        );
        let descriptor = DeviceDescriptor::parse(7, &xml).expect("valid descriptor");

        assert_eq!(descriptor.device_name.as_deref(), Some("SampleEnv"));
        assert_eq!(descriptor.variables.len(), 3);
        assert_eq!(descriptor.variables[0].variable_id, 1);
        assert_eq!(descriptor.variables[0].info.value_type, LogValueType::Double);
        assert_eq!(descriptor.variables[0].info.units.as_deref(), Some("K"));
        assert_eq!(descriptor.variables[1].info.value_type, LogValueType::Int);
        assert_eq!(descriptor.variables[2].info.units, None);
    }

    #[test]
    fn unsupported_types_are_skipped() {
        let xml = descriptor_xml("Chopper", &[(1, "phase", "double array", ""), (2, "speed", "unsigned integer", "Hz")]);
        let descriptor = DeviceDescriptor::parse(3, &xml).expect("valid descriptor");
        assert_eq!(descriptor.variables.len(), 1);
        assert_eq!(descriptor.variables[0].info.name, "speed");
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = DeviceDescriptor::parse(1, "<device><process_variables></device>").unwrap_err();
        assert!(matches!(err, ListenerError::Parse { .. }));
    }
}
