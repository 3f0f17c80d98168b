//! Type-specific package detail records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use goodstock_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Computer {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_num: Option<String>,
    pub size: Option<String>,
    pub cpu: Option<String>,
    pub ram: Option<String>,
    pub hdd: Option<String>,
    pub optical: Option<String>,
    pub video: Option<String>,
    pub sound: Option<String>,
    pub lan: Option<String>,
    pub wireless: Option<String>,
    pub usb: Option<String>,
    pub comp_voltage: Option<String>,
    pub comp_test_status: Option<String>,
    pub os: Option<String>,
    pub os_serial_num: Option<String>,
    pub ms_office_serial_num: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ComputerAccessory {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_num: Option<String>,
    pub size: Option<String>,
    pub interface: Option<String>,
    pub comp_voltage: Option<String>,
    pub comp_test_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Electrical {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub standard: Option<String>,
    pub voltage: Option<String>,
    pub frequency: Option<String>,
    pub power: Option<String>,
    pub system_or_region: Option<String>,
    pub test_status: Option<String>,
    pub tested_on: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Medical {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "detail_type", rename_all = "snake_case")]
pub enum PackageDetail {
    Computer(Computer),
    ComputerAccessory(ComputerAccessory),
    Electrical(Electrical),
    Medical(Medical),
}

impl PackageDetail {
    pub fn kind(&self) -> DetailKind {
        match self {
            PackageDetail::Computer(_) => DetailKind::Computer,
            PackageDetail::ComputerAccessory(_) => DetailKind::ComputerAccessory,
            PackageDetail::Electrical(_) => DetailKind::Electrical,
            PackageDetail::Medical(_) => DetailKind::Medical,
        }
    }
}

/// Which detail record a package type carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    Computer,
    ComputerAccessory,
    Electrical,
    Medical,
}

impl core::str::FromStr for DetailKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "computer" => Ok(DetailKind::Computer),
            "computer_accessory" => Ok(DetailKind::ComputerAccessory),
            "electrical" => Ok(DetailKind::Electrical),
            "medical" => Ok(DetailKind::Medical),
            other => Err(DomainError::validation(
                "detail_type",
                format!("unknown detail type {other:?}"),
            )),
        }
    }
}

/// Builds a [`PackageDetail`] from a flat attribute map.
#[derive(Debug, Clone)]
pub struct DetailBuilder {
    kind: DetailKind,
    attributes: BTreeMap<String, String>,
}

impl DetailBuilder {
    pub fn new(kind: DetailKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes<I, K, V>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .extend(attrs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn build(self) -> DomainResult<PackageDetail> {
        let value = serde_json::to_value(&self.attributes)
            .map_err(|e| DomainError::validation("detail", e.to_string()))?;
        let invalid = |e: serde_json::Error| DomainError::validation("detail", e.to_string());

        Ok(match self.kind {
            DetailKind::Computer => PackageDetail::Computer(serde_json::from_value(value).map_err(invalid)?),
            DetailKind::ComputerAccessory => {
                PackageDetail::ComputerAccessory(serde_json::from_value(value).map_err(invalid)?)
            }
            DetailKind::Electrical => PackageDetail::Electrical(serde_json::from_value(value).map_err(invalid)?),
            DetailKind::Medical => PackageDetail::Medical(serde_json::from_value(value).map_err(invalid)?),
        })
    }
}
