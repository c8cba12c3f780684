use serde::Serialize;

/// A recurring import job for one symbol, as kept by the job registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledJobConfig {
    pub id: String,
    pub symbol: String,
    pub cron_expression: String,
    pub source_url_template: String,
}

impl ScheduledJobConfig {
    pub fn tick_payload(&self) -> TickPayload {
        TickPayload {
            symbol: self.symbol.clone(),
            source_url_template: self.source_url_template.clone(),
        }
    }
}

/// Data carried by a timer and handed over on every fire.
#[derive(Debug, Clone, PartialEq)]
pub struct TickPayload {
    pub symbol: String,
    pub source_url_template: String,
}

impl TickPayload {
    /// Resolve the task for one tick: `{template}{SYMBOL}.json`.
    pub fn fire(&self) -> FetchTask {
        let symbol = self.symbol.to_uppercase();
        let resolved_url = format!("{}{}.json", self.source_url_template, symbol);
        FetchTask {
            symbol,
            resolved_url,
        }
    }
}

/// One unit of executor work, produced once per tick and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub symbol: String,
    pub resolved_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_resolves_upper_case_json_url() {
        let payload = TickPayload {
            symbol: "adbe".to_string(),
            source_url_template: "https://example.com/stock-data/".to_string(),
        };
        let task = payload.fire();
        assert_eq!(task.symbol, "ADBE");
        assert_eq!(task.resolved_url, "https://example.com/stock-data/ADBE.json");
    }
}
