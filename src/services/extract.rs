// src/services/extract.rs
use log::info;

use crate::error::ExtractionError;
use crate::models::{Granularity, PeriodSeries};
use crate::services::chart::{extract_chart, is_chart_markup};
use crate::services::table::{extract_table, is_table_markup, TableSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Chart,
    Table,
}

/// Bar columns win over cells when a section renders both.
pub fn detect_section(markup: &str) -> Option<SectionKind> {
    if is_chart_markup(markup) {
        Some(SectionKind::Chart)
    } else if is_table_markup(markup) {
        Some(SectionKind::Table)
    } else {
        None
    }
}

/// Routes one rendered section to the matching extractor.
pub fn extract_section(
    markup: &str,
    granularity: Granularity,
    settings: &TableSettings,
) -> Result<PeriodSeries, ExtractionError> {
    match detect_section(markup) {
        Some(SectionKind::Chart) => {
            info!("Extracting {} section as bar chart", granularity);
            extract_chart(markup, granularity)
        }
        Some(SectionKind::Table) => {
            info!("Extracting {} section as table", granularity);
            extract_table(markup, granularity, settings)
        }
        None => Err(ExtractionError::NoColumns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_markup_shape() {
        let chart = r#"<div class="horizontalScaleValue-a">2024</div>
            <div class="verticalScaleValue-a">0</div><div class="verticalScaleValue-a">4</div>
            <div class="column-x1"><div class="bar-y" style="height: max(50%, 1px); --inner-bar-color: #3179F5"></div></div>"#;
        assert_eq!(detect_section(chart), Some(SectionKind::Chart));

        let table = r#"<div class="value-a" data-x="0">2024</div><div class="value-a" data-x="0">2.0</div>"#;
        assert_eq!(detect_section(table), Some(SectionKind::Table));

        let settings = TableSettings::new(50.0, 2025);
        let series = extract_section(chart, Granularity::Annual, &settings).unwrap();
        assert_eq!(series.points[0].reported, Some(2.0));
        let series = extract_section(table, Granularity::Annual, &settings).unwrap();
        assert_eq!(series.points[0].reported, Some(2.0));
    }

    #[test]
    fn unrecognized_markup_has_no_columns() {
        let settings = TableSettings::new(50.0, 2025);
        assert_eq!(
            extract_section("<p>layout changed</p>", Granularity::Quarterly, &settings),
            Err(ExtractionError::NoColumns)
        );
    }
}
