use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Returned when no catalog key occurs in the path.
pub const NO_LINK: &str = "#";

const DATASHEETS: &str = "https://www.refu-drive.com/fileadmin/user_upload/Downloads/Datenblaetter/EN";

/// Built-in datasheet table, in lookup order.
const BUILTIN: &[(&str, &str)] = &[
    ("single_inverter.17kva", "20221118_REFUdrive_RPCS-730-17K-17K3K_28K_datasheet_EN_V02.pdf"),
    ("single_inverter.28kva", "20221118_REFUdrive_RPCS-730-17K-17K3K_28K_datasheet_EN_V02.pdf"),
    ("Dual_inverter.2x15kva", "20221118_REFUdrive_RPCS-730-2x15K-2x30K_450V_datasheet_EN_V02.pdf"),
    ("Dual_inverter.2x17kva", "20241021_REFUdrive_RPCS-740-2x17K_datasheet_EN_V03.pdf"),
    ("Dual_inverter.2x30kva", "20221118_REFUdrive_RPCS-730-2x15K-2x30K_450V_datasheet_EN_V02.pdf"),
    ("Dual_inverter.2x28kva", "20221118_REFUdrive_RPCS-730-2x28K-2x55K_850V_datasheet_EN_V02.pdf"),
    ("Dual_inverter.2x55kva", "20221118_REFUdrive_RPCS-730-2x28K-2x55K_850V_datasheet_EN_V02.pdf"),
    ("traction_inverter.80kva", "20221124_REFUdrive_RPCS-730-80K-160K_450V_datasheet_EN_V03.pdf"),
    ("traction_inverter.160kva", "20221124_REFUdrive_RPCS-730-80K-160K_450V_datasheet_EN_V03.pdf"),
    ("traction_inverter.320kva", "20221124_REFUdrive_RPCS-730-150K-320K_850V_datasheet_EN_V03.pdf"),
    ("traction_inverter.150kva", "20221124_REFUdrive_RPCS-730-150K-320K_850V_datasheet_EN_V03.pdf"),
    ("traction_inverter.320kva-HPP", "20221118_REFUdrive_RPCS-730-320K-HPP_datasheet_EN_V02.pdf"),
    ("combi_inverter.17k3k", "20221118_REFUdrive_RPCS-730-17K-17K3K_28K_datasheet_EN_V02.pdf"),
    ("cabinet_inverter.8kva", "20221118_REFUdrive-RPCS-630_datasheet_EN_V03.pdf"),
    ("cabinet_inverter.22kva", "20221118_REFUdrive-RPCS-630_datasheet_EN_V03.pdf"),
    ("cabinet_inverter.55kva", "20221118_REFUdrive-RPCS-630_datasheet_EN_V03.pdf"),
    ("cabinet_inverter.90kva", "20221118_REFUdrive-RPCS-630_datasheet_EN_V03.pdf"),
    ("cabinet_inverter.200kva", "20221118_REFUdrive-RPCS-630_datasheet_EN_V03.pdf"),
    ("DC_DC.4kw-900", "20241024_REFUdrive_RPCS-DC4K-900_6K-750_datasheet_EN_V02.pdf"),
    ("DC_DC.4kw-750", "20241024_REFUdrive_RPCS-DC4K-900_6K-750_datasheet_EN_V02.pdf"),
    ("OBC.450V", "20230921_REFUdrive_22kW_On-Board_Charger_datasheet_EN_V11.pdf"),
    ("OBC.800V", "20230921_REFUdrive_22kW_On-Board_Charger_datasheet_EN_V11.pdf"),
    ("OBC.850V", "20230921_REFUdrive_22kW_On-Board_Charger_datasheet_EN_V11.pdf"),
    ("BCS.IP68housing", "20221118_REFUdrive-Ladeeinheit-AFE220_datasheet_EN_V02.pdf"),
    ("BCS.Cabinet/Component", "20221118_REFUdrive-Ladeeinheit-AFE220_datasheet_EN_V02.pdf"),
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading catalog {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    entry: Vec<CatalogEntry>,
}

/// Product-path substring to datasheet URL. First match in definition order wins.
#[derive(Debug, Clone)]
pub struct PdfCatalog {
    entries: Vec<CatalogEntry>,
}

impl Default for PdfCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PdfCatalog {
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(key, file)| CatalogEntry {
                key: (*key).to_string(),
                url: format!("{DATASHEETS}/{file}"),
            })
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parse `[[entry]]` tables; file order is lookup order.
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        Ok(Self::from_entries(file.entry))
    }

    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&raw)
    }

    pub fn lookup(&self, path: &str) -> &str {
        self.entries
            .iter()
            .find(|entry| path.contains(entry.key.as_str()))
            .map(|entry| entry.url.as_str())
            .unwrap_or(NO_LINK)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_matches_full_paths() {
        let catalog = PdfCatalog::builtin();
        assert_eq!(catalog.len(), 25);
        let url = catalog.lookup("inverter.aux_inverter.Dual_inverter.2x17kva");
        assert!(url.ends_with("20241021_REFUdrive_RPCS-740-2x17K_datasheet_EN_V03.pdf"));
        assert!(catalog.lookup("OBC.800V").contains("On-Board_Charger"));
    }

    #[test]
    fn unknown_path_returns_sentinel() {
        let catalog = PdfCatalog::builtin();
        assert_eq!(catalog.lookup("inverter.mystery"), NO_LINK);
        assert_eq!(catalog.lookup(""), NO_LINK);
        assert_eq!(PdfCatalog::from_entries(vec![]).lookup("OBC.450V"), NO_LINK);
    }

    #[test]
    fn first_match_wins_over_longer_key() {
        let catalog = PdfCatalog::builtin();
        // "traction_inverter.320kva" precedes and is a substring of the HPP key.
        assert!(
            catalog
                .lookup("inverter.traction_inverter.320kva-HPP")
                .contains("150K-320K_850V")
        );
    }

    #[test]
    fn toml_catalog_preserves_order() {
        let catalog = PdfCatalog::from_toml_str(
            r#"
            [[entry]]
            key = "OBC"
            url = "https://example.com/obc.pdf"

            [[entry]]
            key = "OBC.450V"
            url = "https://example.com/obc-450.pdf"
            "#,
        )
        .unwrap();
        assert_eq!(catalog.lookup("OBC.450V"), "https://example.com/obc.pdf");
    }

    #[tokio::test]
    async fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[entry]]\nkey = \"DC_DC\"\nurl = \"https://example.com/dcdc.pdf\""
        )
        .unwrap();
        let catalog = PdfCatalog::load(file.path()).await.unwrap();
        assert_eq!(catalog.lookup("DC_DC.6kw-750"), "https://example.com/dcdc.pdf");

        let missing = PdfCatalog::load(Path::new("/definitely/not/here.toml")).await;
        assert!(matches!(missing, Err(CatalogError::Read { .. })));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            PdfCatalog::from_toml_str("[[entry]]\nkey = 3"),
            Err(CatalogError::Parse(_))
        ));
    }
}
