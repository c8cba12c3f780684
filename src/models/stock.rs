use crate::errors::{Result, StockWatchError};
use crate::store::{Properties, PropertyValue};
use crate::util;
use serde::Serialize;
use serde_json::{Map, Value};

pub const COMPANY: &str = "companyName";
pub const SECTOR: &str = "sector";
pub const LAST_TRADE: &str = "lastTrade";
pub const UPDATE_TIME: &str = "timeOfUpdate";
pub const DAY_OF_UPDATE: &str = "dayOfLastUpdate";
pub const OPEN_PRICE: &str = "openPrice";
pub const RANGE_HIGH: &str = "rangeHigh";
pub const RANGE_LOW: &str = "rangeLow";
pub const VOLUME: &str = "volume";
pub const UP_DOWN: &str = "upDown";
pub const WEEK52_HIGH: &str = "week52High";
pub const WEEK52_LOW: &str = "week52Low";
pub const YTD_CHANGE: &str = "ytdChange";

/// Latest successful quote for one symbol, stored under `<SYMBOL>/trade`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub company_name: String,
    pub sector: String,
    pub last_trade: f64,
    pub time_of_update: String,
    pub day_of_last_update: String,
    pub open_price: f64,
    pub range_high: f64,
    pub range_low: f64,
    pub volume: i64,
    pub up_down: f64,
    pub week52_high: f64,
    pub week52_low: f64,
    pub ytd_change: f64,
}

impl TradeRecord {
    /// Map a flat quote object onto a record. Every field is required;
    /// numbers may arrive either as JSON numbers or as strings.
    pub fn from_quote(quote: &Map<String, Value>) -> Result<Self> {
        let updated_ms = quote_i64(quote, "latestUpdate")?;
        let (time_of_update, day_of_last_update) = util::format_update_time(updated_ms)
            .ok_or_else(|| {
                StockWatchError::mapping("latestUpdate", format!("{} is out of range", updated_ms))
            })?;

        Ok(Self {
            company_name: quote_str(quote, "companyName")?,
            sector: quote_str(quote, "sector")?,
            last_trade: quote_f64(quote, "latestPrice")?,
            time_of_update,
            day_of_last_update,
            open_price: quote_f64(quote, "open")?,
            range_high: quote_f64(quote, "high")?,
            range_low: quote_f64(quote, "low")?,
            volume: quote_i64(quote, "latestVolume")?,
            up_down: quote_f64(quote, "change")?,
            week52_high: quote_f64(quote, "week52High")?,
            week52_low: quote_f64(quote, "week52Low")?,
            ytd_change: quote_f64(quote, "ytdChange")?,
        })
    }

    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(COMPANY.to_string(), PropertyValue::String(self.company_name.clone()));
        props.insert(SECTOR.to_string(), PropertyValue::String(self.sector.clone()));
        props.insert(LAST_TRADE.to_string(), PropertyValue::Double(self.last_trade));
        props.insert(UPDATE_TIME.to_string(), PropertyValue::String(self.time_of_update.clone()));
        props.insert(
            DAY_OF_UPDATE.to_string(),
            PropertyValue::String(self.day_of_last_update.clone()),
        );
        props.insert(OPEN_PRICE.to_string(), PropertyValue::Double(self.open_price));
        props.insert(RANGE_HIGH.to_string(), PropertyValue::Double(self.range_high));
        props.insert(RANGE_LOW.to_string(), PropertyValue::Double(self.range_low));
        props.insert(VOLUME.to_string(), PropertyValue::Long(self.volume));
        props.insert(UP_DOWN.to_string(), PropertyValue::Double(self.up_down));
        props.insert(WEEK52_HIGH.to_string(), PropertyValue::Double(self.week52_high));
        props.insert(WEEK52_LOW.to_string(), PropertyValue::Double(self.week52_low));
        props.insert(YTD_CHANGE.to_string(), PropertyValue::Double(self.ytd_change));
        props
    }

    /// Read a record back from stored properties. Returns `None` when any
    /// property is missing or has the wrong type.
    pub fn from_properties(props: &Properties) -> Option<Self> {
        let text = |key: &str| props.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let number = |key: &str| props.get(key).and_then(|v| v.as_f64());

        Some(Self {
            company_name: text(COMPANY)?,
            sector: text(SECTOR)?,
            last_trade: number(LAST_TRADE)?,
            time_of_update: text(UPDATE_TIME)?,
            day_of_last_update: text(DAY_OF_UPDATE)?,
            open_price: number(OPEN_PRICE)?,
            range_high: number(RANGE_HIGH)?,
            range_low: number(RANGE_LOW)?,
            volume: props.get(VOLUME).and_then(|v| v.as_i64())?,
            up_down: number(UP_DOWN)?,
            week52_high: number(WEEK52_HIGH)?,
            week52_low: number(WEEK52_LOW)?,
            ytd_change: number(YTD_CHANGE)?,
        })
    }
}

fn quote_field<'a>(quote: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    match quote.get(field) {
        Some(Value::Null) | None => Err(StockWatchError::mapping(field, "missing")),
        Some(value) => Ok(value),
    }
}

fn quote_str(quote: &Map<String, Value>, field: &str) -> Result<String> {
    match quote_field(quote, field)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(StockWatchError::mapping(field, format!("expected text, got {}", other))),
    }
}

fn quote_f64(quote: &Map<String, Value>, field: &str) -> Result<f64> {
    let value = match quote_field(quote, field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| StockWatchError::mapping(field, "not a decimal number"))
}

fn quote_i64(quote: &Map<String, Value>, field: &str) -> Result<i64> {
    let value = match quote_field(quote, field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    value.ok_or_else(|| StockWatchError::mapping(field, "not an integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use serde_json::json;

    fn adbe_quote() -> Map<String, Value> {
        let value = json!({
            "companyName": "Adobe",
            "sector": "Tech",
            "latestPrice": "550.12",
            "open": "545.00",
            "high": "552.00",
            "low": "544.00",
            "latestVolume": "1000000",
            "change": "5.12",
            "week52High": "600.00",
            "week52Low": "400.00",
            "ytdChange": "0.12",
            "latestUpdate": "1700000000000"
        });
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn maps_string_encoded_quote() {
        let record = TradeRecord::from_quote(&adbe_quote()).unwrap();
        assert_eq!(record.company_name, "Adobe");
        assert_eq!(record.last_trade, 550.12);
        assert_eq!(record.volume, 1_000_000);
        assert_eq!(record.up_down, 5.12);
        assert_eq!(record.time_of_update, "05:13 PM EST");
        assert_eq!(record.day_of_last_update, "Tue November 14, 2023");
    }

    #[test]
    fn maps_numeric_quote_values() {
        let mut quote = adbe_quote();
        quote.insert("latestPrice".to_string(), json!(550.12));
        quote.insert("latestVolume".to_string(), json!(1000000));
        quote.insert("latestUpdate".to_string(), json!(1700000000000i64));
        let record = TradeRecord::from_quote(&quote).unwrap();
        assert_eq!(record.last_trade, 550.12);
        assert_eq!(record.volume, 1_000_000);
    }

    #[test]
    fn missing_field_is_a_mapping_error() {
        let mut quote = adbe_quote();
        quote.remove("week52Low");
        let err = TradeRecord::from_quote(&quote).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MappingError);
        assert!(err.to_string().contains("week52Low"));
    }

    #[test]
    fn non_numeric_field_is_a_mapping_error() {
        let mut quote = adbe_quote();
        quote.insert("open".to_string(), json!("n/a"));
        assert_eq!(
            TradeRecord::from_quote(&quote).unwrap_err().kind(),
            FailureKind::MappingError
        );

        let mut quote = adbe_quote();
        quote.insert("latestVolume".to_string(), json!("12.5"));
        assert_eq!(
            TradeRecord::from_quote(&quote).unwrap_err().kind(),
            FailureKind::MappingError
        );
    }

    #[test]
    fn properties_round_trip() {
        let record = TradeRecord::from_quote(&adbe_quote()).unwrap();
        let props = record.to_properties();
        assert_eq!(props.len(), 13);
        assert_eq!(props.get(VOLUME), Some(&PropertyValue::Long(1_000_000)));
        assert_eq!(TradeRecord::from_properties(&props), Some(record));
    }
}
