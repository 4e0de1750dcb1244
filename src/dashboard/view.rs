use anyhow::Result;
use arrow::{
    array::AsArray,
    datatypes::{Float64Type, TimestampMillisecondType},
    record_batch::RecordBatch,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::{
    dataset::{Dataset, Selection},
    query::{aggregate_sum, qualitative_table, Classification, MetricGroup, QualitativeTable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Danger,
    Warning,
    Info,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Area,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub metric: String,
    pub title: String,
    pub kind: ChartKind,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub group: MetricGroup,
    pub title: &'static str,
    pub charts: Vec<Chart>,
    pub notices: Vec<Notice>,
    pub table: Option<QualitativeTable>,
}

impl Section {
    fn new(group: MetricGroup) -> Self {
        Self {
            group,
            title: group.title(),
            charts: Vec::new(),
            notices: Vec::new(),
            table: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardView {
    pub notices: Vec<Notice>,
    pub sections: Vec<Section>,
    pub rows: usize,
}

impl DashboardView {
    fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            notices: vec![Notice::new(level, message)],
            ..Self::default()
        }
    }
}

/// Query string of `GET /api/dashboard`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub date_col: Option<String>,
    /// Comma-joined fund identifiers.
    pub funds: Option<String>,
    pub year: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
}

fn format_date(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn series(aggregated: &RecordBatch) -> Vec<SeriesPoint> {
    let dates = aggregated.column(0).as_primitive::<TimestampMillisecondType>();
    let sums = aggregated.column(1).as_primitive::<Float64Type>();
    dates
        .values()
        .iter()
        .zip(sums.values().iter())
        .map(|(d, v)| SeriesPoint {
            date: format_date(*d),
            value: *v,
        })
        .collect()
}

fn chart_section(
    group: MetricGroup,
    kind: ChartKind,
    batch: &RecordBatch,
    date_col: &str,
    metrics: &[String],
) -> Section {
    let mut section = Section::new(group);
    for metric in metrics {
        let start = Instant::now();
        match aggregate_sum(batch, date_col, metric) {
            Ok(agg) if agg.num_rows() == 0 => section.notices.push(Notice::new(
                NoticeLevel::Secondary,
                format!("Sem dados para {} com os filtros selecionados.", metric),
            )),
            Ok(agg) => {
                info!(metric = %metric, groups = agg.num_rows(), elapsed = ?start.elapsed(), "grouped metric");
                let title = match kind {
                    ChartKind::Line => format!("Evolução de {}", metric),
                    ChartKind::Area => metric.clone(),
                };
                section.charts.push(Chart {
                    metric: metric.clone(),
                    title,
                    kind,
                    points: series(&agg),
                });
            }
            Err(e) => {
                warn!(metric = %metric, error = %format!("{:#}", e), "aggregation failed");
                section.notices.push(Notice::new(
                    NoticeLevel::Danger,
                    format!("Erro ao gerar gráfico de {}: {:#}", metric, e),
                ));
            }
        }
    }
    section
}

fn qualitative_section(
    classification: &Classification,
    batch: &RecordBatch,
    fund_column: Option<&str>,
) -> Section {
    let mut section = Section::new(MetricGroup::Qualitative);
    let schema = batch.schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    let columns = classification.columns(MetricGroup::Qualitative, names.iter().copied(), fund_column);
    let id_column = fund_column.or_else(|| names.first().copied());

    match id_column.filter(|c| names.contains(c)) {
        Some(id) if !columns.is_empty() => match qualitative_table(batch, id, &columns) {
            Ok(table) if table.is_empty() => section.notices.push(Notice::new(
                NoticeLevel::Secondary,
                "Sem dados qualitativos disponíveis com os filtros selecionados.",
            )),
            Ok(table) => section.table = Some(table),
            Err(e) => section.notices.push(Notice::new(
                NoticeLevel::Danger,
                format!("Erro ao gerar tabela qualitativa: {:#}", e),
            )),
        },
        _ => section.notices.push(Notice::new(
            NoticeLevel::Secondary,
            "Sem dados qualitativos disponíveis.",
        )),
    }
    section
}

/// Compute every section of the dashboard for one selection.
#[instrument(level = "info", skip(dataset, classification))]
pub fn build_dashboard(
    dataset: &Dataset,
    classification: &Classification,
    query: &DashboardQuery,
) -> Result<DashboardView> {
    let start = Instant::now();

    if dataset.is_empty() {
        return Ok(DashboardView::notice(
            NoticeLevel::Danger,
            "Nenhum dado carregado. Verifique a pasta de arquivos CSV.",
        ));
    }
    let Some(date_col) = non_empty(&query.date_col) else {
        return Ok(DashboardView::notice(NoticeLevel::Warning, "Selecione uma coluna de data."));
    };
    let year = non_empty(&query.year);
    if year.is_none() && !dataset.years().is_empty() {
        return Ok(DashboardView::notice(NoticeLevel::Warning, "Selecione um ano."));
    }

    let selection = Selection::from_fund_key(
        Some(date_col.clone()),
        query.funds.as_deref().unwrap_or_default(),
        year,
    );
    let batch = dataset.filter(&selection)?;
    if batch.num_rows() == 0 {
        return Ok(DashboardView::notice(
            NoticeLevel::Info,
            "Nenhum dado encontrado com os filtros selecionados.",
        ));
    }

    let schema = batch.schema();
    let names = || schema.fields().iter().map(|f| f.name().as_str());
    let fund_column = dataset.fund_column();
    let mut view = DashboardView {
        rows: batch.num_rows(),
        ..DashboardView::default()
    };

    for (group, kind) in [
        (MetricGroup::Portfolio, ChartKind::Line),
        (MetricGroup::Financial, ChartKind::Area),
    ] {
        let metrics = classification.columns(group, names(), fund_column);
        if !metrics.is_empty() {
            view.sections
                .push(chart_section(group, kind, &batch, &date_col, &metrics));
        }
    }
    view.sections
        .push(qualitative_section(classification, &batch, fund_column));

    info!(rows = view.rows, elapsed = ?start.elapsed(), "dashboard built");
    Ok(view)
}

/// Choices for the selectors, plus the defaults the UI preselects.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardOptions {
    pub date_columns: Vec<String>,
    pub funds: Vec<String>,
    pub years: Vec<i32>,
    pub default_date_column: Option<String>,
    pub default_year: Option<i32>,
    pub records: usize,
}

pub fn dashboard_options(dataset: &Dataset) -> Result<DashboardOptions> {
    let date_columns = dataset.date_columns();
    Ok(DashboardOptions {
        default_date_column: date_columns.first().cloned(),
        default_year: dataset.years().last().copied(),
        date_columns,
        funds: dataset.fund_ids()?,
        years: dataset.years().to_vec(),
        records: dataset.num_rows(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        dataset::DEFAULT_YEAR_PREFIX,
        test_support::{init_test_logging, latin1, write_file},
    };
    use tempfile::{tempdir, TempDir};

    pub(crate) fn fixture() -> (TempDir, Dataset) {
        init_test_logging();
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "inf_trimestral_fii_2023",
            "geral_2023.csv",
            &latin1(
                "CNPJ_Fundo;Data_Referencia;Valor_CRI;Taxa_Vacancia;Receita_Obs;Mercado_Negociacao\n\
                 aa;2023-03-31;10;0,1;n/d;Bolsa\n\
                 bb;2023-03-31;5;0,2;n/d;Balcão\n\
                 aa;2023-06-30;7;;ok;Bolsa\n",
            ),
        );
        write_file(
            dir.path(),
            "inf_trimestral_fii_2024",
            "geral_2024.csv",
            &latin1(
                "CNPJ_Fundo;Data_Referencia;Valor_CRI\n\
                 aa;2024-03-31;1\n",
            ),
        );
        let ds = Dataset::open(dir.path(), DEFAULT_YEAR_PREFIX).unwrap();
        (dir, ds)
    }

    fn query(date_col: Option<&str>, funds: &str, year: Option<&str>) -> DashboardQuery {
        DashboardQuery {
            date_col: date_col.map(str::to_string),
            funds: Some(funds.to_string()),
            year: year.map(str::to_string),
        }
    }

    fn only_notice(view: &DashboardView) -> (NoticeLevel, &str) {
        assert!(view.sections.is_empty());
        assert_eq!(view.notices.len(), 1);
        (view.notices[0].level, view.notices[0].message.as_str())
    }

    #[test]
    fn guards_come_before_any_work() -> Result<()> {
        let (_dir, ds) = fixture();
        let c = Classification::default();

        let v = build_dashboard(&ds, &c, &query(None, "", Some("2023")))?;
        assert_eq!(only_notice(&v).0, NoticeLevel::Warning);

        let v = build_dashboard(&ds, &c, &query(Some("Data_Referencia"), "", Some("")))?;
        assert_eq!(only_notice(&v), (NoticeLevel::Warning, "Selecione um ano."));

        let v = build_dashboard(&ds, &c, &query(Some("Data_Referencia"), "", Some("1999")))?;
        assert_eq!(only_notice(&v).0, NoticeLevel::Info);

        let v = build_dashboard(&ds, &c, &query(Some("Data_Referencia"), "zz", Some("2023")))?;
        assert_eq!(only_notice(&v).0, NoticeLevel::Info);
        Ok(())
    }

    #[test]
    fn empty_dataset_is_a_danger_notice() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let ds = Dataset::open(dir.path(), DEFAULT_YEAR_PREFIX)?;
        let v = build_dashboard(&ds, &Classification::default(), &DashboardQuery::default())?;
        assert_eq!(only_notice(&v).0, NoticeLevel::Danger);
        Ok(())
    }

    #[test]
    fn sections_for_a_year() -> Result<()> {
        let (_dir, ds) = fixture();
        let v = build_dashboard(
            &ds,
            &Classification::default(),
            &query(Some("Data_Referencia"), "", Some("2023")),
        )?;
        assert!(v.notices.is_empty());
        assert_eq!(v.rows, 3);
        let groups: Vec<_> = v.sections.iter().map(|s| s.group).collect();
        assert_eq!(
            groups,
            vec![MetricGroup::Portfolio, MetricGroup::Financial, MetricGroup::Qualitative]
        );

        let portfolio = &v.sections[0];
        assert_eq!(portfolio.charts.len(), 1);
        let cri = &portfolio.charts[0];
        assert_eq!(cri.kind, ChartKind::Line);
        assert_eq!(cri.title, "Evolução de Valor_CRI");
        assert_eq!(
            cri.points,
            vec![
                SeriesPoint { date: "2023-03-31".into(), value: 15.0 },
                SeriesPoint { date: "2023-06-30".into(), value: 7.0 },
            ]
        );

        // the text column fails, its sibling still charts
        let financial = &v.sections[1];
        assert_eq!(financial.charts.len(), 1);
        assert_eq!(financial.charts[0].metric, "Taxa_Vacancia");
        assert_eq!(financial.charts[0].kind, ChartKind::Area);
        assert_eq!(financial.notices.len(), 1);
        assert_eq!(financial.notices[0].level, NoticeLevel::Danger);
        assert!(financial.notices[0].message.contains("Receita_Obs"));

        let table = v.sections[2].table.as_ref().unwrap();
        assert_eq!(table.columns, vec!["CNPJ_Fundo", "Mercado_Negociacao"]);
        assert_eq!(table.rows.len(), 2);
        Ok(())
    }

    #[test]
    fn fund_selection_narrows_the_series() -> Result<()> {
        let (_dir, ds) = fixture();
        let v = build_dashboard(
            &ds,
            &Classification::default(),
            &query(Some("Data_Referencia"), "bb", Some("2023")),
        )?;
        assert_eq!(v.rows, 1);
        assert_eq!(v.sections[0].charts[0].points.len(), 1);
        assert_eq!(v.sections[0].charts[0].points[0].value, 5.0);
        Ok(())
    }

    #[test]
    fn qualitative_section_without_columns() -> Result<()> {
        let (_dir, ds) = fixture();
        let c = Classification {
            qualitative: vec!["NADA".into()],
            ..Classification::default()
        };
        let v = build_dashboard(&ds, &c, &query(Some("Data_Referencia"), "", Some("2024")))?;
        let qual = v.sections.last().unwrap();
        assert!(qual.table.is_none());
        assert_eq!(qual.notices[0].level, NoticeLevel::Secondary);
        Ok(())
    }

    #[test]
    fn options_list_the_selectors() -> Result<()> {
        let (_dir, ds) = fixture();
        let o = dashboard_options(&ds)?;
        assert_eq!(o.date_columns, vec!["Data_Referencia"]);
        assert_eq!(o.default_date_column.as_deref(), Some("Data_Referencia"));
        assert_eq!(o.funds, vec!["aa", "bb"]);
        assert_eq!(o.years, vec![2023, 2024]);
        assert_eq!(o.default_year, Some(2024));
        assert_eq!(o.records, 4);
        Ok(())
    }
}
