use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::load::{infer::is_date_column, SOURCE_FOLDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricGroup {
    Portfolio,
    Financial,
    Qualitative,
}

impl MetricGroup {
    pub const ALL: [MetricGroup; 3] = [Self::Portfolio, Self::Financial, Self::Qualitative];

    pub fn title(self) -> &'static str {
        match self {
            Self::Portfolio => "Portfólio",
            Self::Financial => "Financeiro / Operacional",
            Self::Qualitative => "Qualitativo",
        }
    }
}

/// Substring tokens, matched against upper-cased column names, that place a
/// column into a metric group. Missing YAML keys keep the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    pub portfolio: Vec<String>,
    pub financial: Vec<String>,
    pub qualitative: Vec<String>,
}

impl Default for Classification {
    fn default() -> Self {
        let owned = |t: &[&str]| t.iter().map(|s| s.to_string()).collect();
        Self {
            portfolio: owned(&["CRI", "IMOB", "ACOES"]),
            financial: owned(&["REC", "CUST", "VAC", "INADIM"]),
            qualitative: owned(&["MERC", "PUBLIC"]),
        }
    }
}

impl Classification {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing classification YAML")
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading classification file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn tokens(&self, group: MetricGroup) -> &[String] {
        match group {
            MetricGroup::Portfolio => &self.portfolio,
            MetricGroup::Financial => &self.financial,
            MetricGroup::Qualitative => &self.qualitative,
        }
    }

    pub fn matches(&self, group: MetricGroup, column: &str) -> bool {
        let upper = column.to_uppercase();
        self.tokens(group)
            .iter()
            .any(|tok| upper.contains(&tok.to_uppercase()))
    }

    /// Columns of `group` in table order. Date columns, the fund column and
    /// the provenance tag are never metrics.
    pub fn columns<'a, I>(&self, group: MetricGroup, names: I, fund_column: Option<&str>) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|n| *n != SOURCE_FOLDER && Some(*n) != fund_column && !is_date_column(n))
            .filter(|n| self.matches(group, n))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const COLUMNS: &[&str] = &[
        "CNPJ_Fundo",
        "Data_Referencia",
        "Valor_CRI",
        "Valor_Imoveis_Renda_Acabados",
        "Receita_Aluguel",
        "Taxa_Vacancia",
        "Mercado_Negociacao",
        "Publico_Alvo",
        "Custo_Recebiveis",
        "source_folder",
    ];

    #[test]
    fn default_groups() {
        let c = Classification::default();
        let cols = |g| c.columns(g, COLUMNS.iter().copied(), Some("CNPJ_Fundo"));
        assert_eq!(cols(MetricGroup::Portfolio), vec!["Valor_CRI"]);
        assert_eq!(
            cols(MetricGroup::Financial),
            vec!["Receita_Aluguel", "Taxa_Vacancia", "Custo_Recebiveis"]
        );
        assert_eq!(cols(MetricGroup::Qualitative), vec!["Mercado_Negociacao", "Publico_Alvo"]);
    }

    #[test]
    fn a_column_can_be_in_several_groups() {
        let c = Classification::default();
        assert!(c.matches(MetricGroup::Portfolio, "Receita_CRI"));
        assert!(c.matches(MetricGroup::Financial, "Receita_CRI"));
        assert!(!c.matches(MetricGroup::Qualitative, "Receita_CRI"));
    }

    #[test]
    fn yaml_overrides_only_given_keys() -> anyhow::Result<()> {
        let c = Classification::from_yaml_str("portfolio: [imov, cri]\n")?;
        assert_eq!(c.portfolio, vec!["imov", "cri"]);
        assert_eq!(c.financial, Classification::default().financial);
        assert!(c.matches(MetricGroup::Portfolio, "Valor_Imoveis_Renda_Acabados"));

        let dir = tempdir()?;
        let path = dir.path().join("classes.yaml");
        fs::write(&path, "qualitative:\n  - SEGMENTO\n")?;
        let c = Classification::from_yaml_file(&path)?;
        assert_eq!(c.qualitative, vec!["SEGMENTO"]);

        assert!(Classification::from_yaml_str("portfolio: 3").is_err());
        Ok(())
    }
}
