// Copyright 2025 Azure Identity for Rust Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Authority hosts and authority URL helpers.

use crate::build_errors::Error as BuildError;
use crate::constants::ADFS_TENANT_ID;
use crate::env::{AZURE_AUTHORITY_HOST, Environment};

/// The default authority host, the Azure public cloud.
pub(crate) const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Well-known authority hosts for the Azure clouds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AzureAuthorityHosts {
    /// China-based Azure authority host.
    AzureChina,
    /// Germany-based Azure authority host.
    AzureGermany,
    /// US Government Azure authority host.
    AzureGovernment,
    /// Public cloud Azure authority host.
    AzurePublicCloud,
}

impl AzureAuthorityHosts {
    /// The URL of the authority host.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzureChina => "https://login.chinacloudapi.cn",
            Self::AzureGermany => "https://login.microsoftonline.de",
            Self::AzureGovernment => "https://login.microsoftonline.us",
            Self::AzurePublicCloud => DEFAULT_AUTHORITY_HOST,
        }
    }
}

impl From<AzureAuthorityHosts> for String {
    fn from(value: AzureAuthorityHosts) -> Self {
        value.as_str().to_string()
    }
}

/// Regional endpoints for confidential client flows.
///
/// Applications running in Azure can reduce latency by sending token
/// requests to the identity endpoints of their own region.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegionalAuthority {
    /// Detect the region from the environment.
    AutoDiscoverRegion,
    /// The `westus` region.
    USWest,
    /// The `westus2` region.
    USWest2,
    /// The `centralus` region.
    USCentral,
    /// The `eastus` region.
    USEast,
    /// The `eastus2` region.
    USEast2,
    /// The `northcentralus` region.
    USNorthCentral,
    /// The `southcentralus` region.
    USSouthCentral,
    /// The `westcentralus` region.
    USWestCentral,
    /// The `canadacentral` region.
    CanadaCentral,
    /// The `canadaeast` region.
    CanadaEast,
    /// The `brazilsouth` region.
    BrazilSouth,
    /// The `northeurope` region.
    EuropeNorth,
    /// The `westeurope` region.
    EuropeWest,
    /// The `uksouth` region.
    UKSouth,
    /// The `ukwest` region.
    UKWest,
    /// The `francecentral` region.
    FranceCentral,
    /// The `francesouth` region.
    FranceSouth,
    /// The `switzerlandnorth` region.
    SwitzerlandNorth,
    /// The `switzerlandwest` region.
    SwitzerlandWest,
    /// The `germanynorth` region.
    GermanyNorth,
    /// The `germanywestcentral` region.
    GermanyWestCentral,
    /// The `norwaywest` region.
    NorwayWest,
    /// The `norwayeast` region.
    NorwayEast,
    /// The `eastasia` region.
    AsiaEast,
    /// The `southeastasia` region.
    AsiaSouthEast,
    /// The `japaneast` region.
    JapanEast,
    /// The `japanwest` region.
    JapanWest,
    /// The `australiaeast` region.
    AustraliaEast,
    /// The `australiasoutheast` region.
    AustraliaSouthEast,
    /// The `australiacentral` region.
    AustraliaCentral,
    /// The `australiacentral2` region.
    AustraliaCentral2,
    /// The `centralindia` region.
    IndiaCentral,
    /// The `southindia` region.
    IndiaSouth,
    /// The `westindia` region.
    IndiaWest,
    /// The `koreasouth` region.
    KoreaSouth,
    /// The `koreacentral` region.
    KoreaCentral,
    /// The `uaecentral` region.
    UAECentral,
    /// The `uaenorth` region.
    UAENorth,
    /// The `southafricanorth` region.
    SouthAfricaNorth,
    /// The `southafricawest` region.
    SouthAfricaWest,
    /// The `chinanorth` region.
    ChinaNorth,
    /// The `chinaeast` region.
    ChinaEast,
    /// The `chinanorth2` region.
    ChinaNorth2,
    /// The `chinaeast2` region.
    ChinaEast2,
    /// The `germanycentral` region.
    GermanyCentral,
    /// The `germanynortheast` region.
    GermanyNorthEast,
    /// The `usgovvirginia` region.
    GovernmentUSVirginia,
    /// The `usgoviowa` region.
    GovernmentUSIowa,
    /// The `usgovarizona` region.
    GovernmentUSArizona,
    /// The `usgovtexas` region.
    GovernmentUSTexas,
    /// The `usdodeast` region.
    GovernmentUSDodEast,
    /// The `usdodcentral` region.
    GovernmentUSDodCentral,
    /// A region not listed in this enumeration.
    Other(String),
}

impl RegionalAuthority {
    /// The region name used in regional token endpoints.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AutoDiscoverRegion => "AutoDiscoverRegion",
            Self::USWest => "westus",
            Self::USWest2 => "westus2",
            Self::USCentral => "centralus",
            Self::USEast => "eastus",
            Self::USEast2 => "eastus2",
            Self::USNorthCentral => "northcentralus",
            Self::USSouthCentral => "southcentralus",
            Self::USWestCentral => "westcentralus",
            Self::CanadaCentral => "canadacentral",
            Self::CanadaEast => "canadaeast",
            Self::BrazilSouth => "brazilsouth",
            Self::EuropeNorth => "northeurope",
            Self::EuropeWest => "westeurope",
            Self::UKSouth => "uksouth",
            Self::UKWest => "ukwest",
            Self::FranceCentral => "francecentral",
            Self::FranceSouth => "francesouth",
            Self::SwitzerlandNorth => "switzerlandnorth",
            Self::SwitzerlandWest => "switzerlandwest",
            Self::GermanyNorth => "germanynorth",
            Self::GermanyWestCentral => "germanywestcentral",
            Self::NorwayWest => "norwaywest",
            Self::NorwayEast => "norwayeast",
            Self::AsiaEast => "eastasia",
            Self::AsiaSouthEast => "southeastasia",
            Self::JapanEast => "japaneast",
            Self::JapanWest => "japanwest",
            Self::AustraliaEast => "australiaeast",
            Self::AustraliaSouthEast => "australiasoutheast",
            Self::AustraliaCentral => "australiacentral",
            Self::AustraliaCentral2 => "australiacentral2",
            Self::IndiaCentral => "centralindia",
            Self::IndiaSouth => "southindia",
            Self::IndiaWest => "westindia",
            Self::KoreaSouth => "koreasouth",
            Self::KoreaCentral => "koreacentral",
            Self::UAECentral => "uaecentral",
            Self::UAENorth => "uaenorth",
            Self::SouthAfricaNorth => "southafricanorth",
            Self::SouthAfricaWest => "southafricawest",
            Self::ChinaNorth => "chinanorth",
            Self::ChinaEast => "chinaeast",
            Self::ChinaNorth2 => "chinanorth2",
            Self::ChinaEast2 => "chinaeast2",
            Self::GermanyCentral => "germanycentral",
            Self::GermanyNorthEast => "germanynortheast",
            Self::GovernmentUSVirginia => "usgovvirginia",
            Self::GovernmentUSIowa => "usgoviowa",
            Self::GovernmentUSArizona => "usgovarizona",
            Self::GovernmentUSTexas => "usgovtexas",
            Self::GovernmentUSDodEast => "usdodeast",
            Self::GovernmentUSDodCentral => "usdodcentral",
            Self::Other(s) => s.as_str(),
        }
    }

    pub(crate) fn from_name(name: &str) -> Self {
        if name == "AutoDiscoverRegion" {
            return Self::AutoDiscoverRegion;
        }
        Self::Other(name.to_string())
    }
}

/// Returns the authority URL for `tenant_id` on `host`.
///
/// The host is returned unchanged if it already names the tenant.
pub(crate) fn get_authority(tenant_id: &str, host: Option<&str>) -> String {
    let host = host.unwrap_or(DEFAULT_AUTHORITY_HOST);
    let trimmed = host.strip_suffix('/').unwrap_or(host);
    if trimmed.ends_with(tenant_id) {
        return host.to_string();
    }
    format!("{trimmed}/{tenant_id}")
}

/// Authorities the token engine trusts without instance discovery.
pub(crate) fn get_known_authorities(
    tenant_id: &str,
    authority_host: &str,
    disable_instance_discovery: bool,
) -> Vec<String> {
    if tenant_id == ADFS_TENANT_ID || disable_instance_discovery {
        return vec![authority_host.to_string()];
    }
    Vec::new()
}

/// The path of the token endpoint, relative to the authority.
pub(crate) fn token_endpoint_suffix(tenant_id: &str) -> &'static str {
    if tenant_id == ADFS_TENANT_ID {
        "oauth2/token"
    } else {
        "oauth2/v2.0/token"
    }
}

/// Resolves the authority host from the builder option, the environment, or
/// the default.
pub(crate) fn resolve_authority_host(
    option: Option<&str>,
    env: &Environment,
) -> Result<String, BuildError> {
    let host = option
        .or_else(|| env.get(AZURE_AUTHORITY_HOST))
        .unwrap_or(DEFAULT_AUTHORITY_HOST);
    if !host.starts_with("https:") {
        return Err(BuildError::invalid(
            "The authorityHost address must use the 'https' protocol.",
        ));
    }
    Ok(host.to_string())
}
