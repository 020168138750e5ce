use adsight_api::{
    AnalysisBlock, ChartType, ChatBlock, ChatMessage, ChatResponse, ListStyle, RagMetadata, Role,
    Trend,
};
use serde_json::Value;

pub fn render_response(response: &ChatResponse) -> Vec<String> {
    let mut lines = render_blocks(&response.blocks);
    if let Some(meta) = &response.rag_metadata {
        lines.extend(render_rag_metadata(meta));
    }
    lines
}

pub fn render_blocks(blocks: &[ChatBlock]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.extend(render_block(block));
    }
    lines
}

pub fn render_block(block: &ChatBlock) -> Vec<String> {
    match block {
        ChatBlock::Text { content, .. } => content.lines().map(String::from).collect(),
        ChatBlock::Table {
            title, columns, rows, ..
        } => {
            let mut lines = heading(title.as_deref());
            lines.extend(render_table(columns, rows));
            lines
        }
        ChatBlock::List { title, items, style } => {
            let mut lines = heading(title.as_deref());
            for (i, item) in items.iter().enumerate() {
                let marker = match style {
                    ListStyle::Numbered => format!("{}.", i + 1),
                    ListStyle::Dotted => "·".to_string(),
                    ListStyle::Bulleted => "•".to_string(),
                };
                lines.push(format!("  {marker} {item}"));
            }
            lines
        }
        ChatBlock::Actions { title, items } => {
            let mut lines = heading(Some(title.as_deref().unwrap_or("Suggested actions")));
            lines.extend(items.iter().map(|a| format!("  [{}] {}", a.id, a.label)));
            lines
        }
        ChatBlock::Chart {
            title,
            chart_type,
            labels,
            datasets,
            ..
        } => {
            let kind = match chart_type {
                ChartType::Pie => "pie chart",
                ChartType::Bar => "bar chart",
                ChartType::Line => "line chart",
            };
            let mut lines = vec![format!("{} ({kind})", title.as_deref().unwrap_or("Chart"))];
            for dataset in datasets {
                lines.push(format!("  {}", dataset.label));
                for (label, value) in labels.iter().zip(&dataset.data) {
                    lines.push(format!("    {label}: {}", format_number(*value)));
                }
            }
            lines
        }
        ChatBlock::Metric {
            title,
            value,
            change,
            trend,
        } => {
            let arrow = match trend {
                Trend::Up => "▲",
                Trend::Down => "▼",
                Trend::Neutral => "–",
            };
            let mut line = format!("{}: {value}", title.as_deref().unwrap_or("Metric"));
            if let Some(change) = change {
                line.push_str(&format!(" {arrow} {change}"));
            }
            vec![line]
        }
        ChatBlock::Image { title, content } => {
            vec![format!("[image] {}: {content}", title.as_deref().unwrap_or("Image"))]
        }
        ChatBlock::DigDeeper {
            title,
            description,
            action_id,
            current_depth,
            max_depth,
        } => {
            let mut lines = vec![format!("{title} (depth {current_depth}/{max_depth})")];
            if !description.is_empty() {
                lines.push(format!("  {description}"));
            }
            lines.push(format!("  dig deeper: /action {action_id}"));
            lines
        }
        ChatBlock::BudgetOptimizations(analysis)
        | ChatBlock::CampaignConsistencyAnalysis(analysis)
        | ChatBlock::SitelinkAnalysis(analysis)
        | ChatBlock::LandingPageAnalysis(analysis)
        | ChatBlock::DuplicateKeywordAnalysis(analysis)
        | ChatBlock::KeywordTrendsAnalysis(analysis)
        | ChatBlock::AuctionInsightsAnalysis(analysis)
        | ChatBlock::SearchTermAnalysis(analysis)
        | ChatBlock::AdsShowingTimeAnalysis(analysis)
        | ChatBlock::DevicePerformanceDetailedAnalysis(analysis)
        | ChatBlock::LocationPerformanceAnalysis(analysis)
        | ChatBlock::LandingPageMobileAnalysis(analysis)
        | ChatBlock::TcpaOptimizations(analysis)
        | ChatBlock::BudgetAllocationOptimizations(analysis)
        | ChatBlock::NegativeKeywordSuggestions(analysis) => {
            render_analysis(block.analysis_heading().unwrap_or("Analysis"), analysis)
        }
        ChatBlock::RagEnhancedResponse {
            blocks, rag_metadata, ..
        } => {
            let mut lines = render_blocks(blocks);
            if let Some(meta) = rag_metadata {
                lines.extend(render_rag_metadata(meta));
            }
            lines
        }
        ChatBlock::Unknown => vec!["(unsupported content)".to_string()],
    }
}

pub fn render_message(message: &ChatMessage) -> Vec<String> {
    let speaker = match message.role {
        Role::User => "you",
        Role::Ai => "assistant",
    };
    let mut lines = vec![format!("{speaker}>")];
    match &message.response {
        Some(response) if !response.blocks.is_empty() => {
            lines.extend(render_response(response).into_iter().map(|l| format!("  {l}")))
        }
        _ => lines.extend(message.content.lines().map(|l| format!("  {l}"))),
    }
    lines
}

fn heading(title: Option<&str>) -> Vec<String> {
    title.map(|t| vec![t.to_string()]).unwrap_or_default()
}

fn render_analysis(fallback: &str, analysis: &AnalysisBlock) -> Vec<String> {
    let mut lines = vec![analysis.title.clone().unwrap_or_else(|| fallback.to_string())];
    if let Some(account) = analysis.account.as_ref().map(cell_text).filter(|a| !a.is_empty()) {
        lines.push(format!("  account: {account}"));
    }
    if let Some(content) = &analysis.content {
        lines.extend(content.lines().map(|l| format!("  {l}")));
    }
    lines
}

fn render_rag_metadata(meta: &RagMetadata) -> Vec<String> {
    if !meta.context_used {
        return Vec::new();
    }
    let sources = meta
        .context_sources
        .as_ref()
        .filter(|s| !s.is_empty())
        .map(|s| s.join(", "))
        .unwrap_or_else(|| "account data".to_string());
    vec![format!("(context: {sources})")]
}

fn render_table(columns: &[String], rows: &[Vec<Value>]) -> Vec<String> {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    let width_count = columns.len().max(cells.iter().map(Vec::len).max().unwrap_or(0));
    let mut widths = vec![0; width_count];
    for (i, column) in columns.iter().enumerate() {
        widths[i] = column.chars().count();
    }
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let format_row = |row: &[String]| {
        row.iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::new();
    if !columns.is_empty() {
        lines.push(format_row(columns));
        lines.push(
            widths
                .iter()
                .take(columns.len())
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
    }
    lines.extend(cells.iter().map(|row| format_row(row)));
    lines
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blocks(value: Value) -> Vec<ChatBlock> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn table_columns_are_aligned() {
        let lines = render_blocks(&blocks(json!([{
            "type": "table",
            "title": "Campaigns",
            "columns": ["Name", "Clicks"],
            "rows": [["Brand", 1200], ["Generic search", 85.5]]
        }])));
        assert_eq!(
            lines,
            vec![
                "Campaigns",
                "Name           | Clicks",
                "---------------+-------",
                "Brand          | 1200",
                "Generic search | 85.50",
            ]
        );
    }

    #[test]
    fn numbered_list_and_metric() {
        let lines = render_blocks(&blocks(json!([
            { "type": "list", "style": "numbered", "items": ["Pause keyword", "Raise bid"] },
            { "type": "metric", "title": "CTR", "value": "4.2%", "change": "+0.3%", "trend": "up" }
        ])));
        assert_eq!(lines, vec!["  1. Pause keyword", "  2. Raise bid", "", "CTR: 4.2% ▲ +0.3%"]);
    }

    #[test]
    fn analysis_without_title_uses_kind_heading() {
        let lines = render_block(&blocks(json!([{
            "type": "negative_keyword_suggestions",
            "content": "Add \"free\" as negative"
        }]))[0]);
        assert_eq!(lines[0], "Negative Keyword Suggestions");
        assert_eq!(lines[1], "  Add \"free\" as negative");
    }

    #[test]
    fn rag_wrapper_renders_nested_blocks_and_sources() {
        let lines = render_blocks(&blocks(json!([{
            "type": "rag_enhanced",
            "blocks": [{ "type": "text", "content": "Spend rose" }],
            "rag_metadata": { "context_used": true, "context_sources": ["campaigns"], "selection_reason": "" }
        }])));
        assert_eq!(lines, vec!["Spend rose", "(context: campaigns)"]);
    }

    #[test]
    fn unknown_block_is_not_dropped_silently() {
        let lines = render_blocks(&blocks(json!([{ "type": "hologram" }])));
        assert_eq!(lines, vec!["(unsupported content)"]);
    }
}
