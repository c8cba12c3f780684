use chrono::{TimeZone, Utc};
use chrono_tz::America::New_York;

// Quotes are reported in exchange time
pub fn format_update_time(epoch_millis: i64) -> Option<(String, String)> {
    let utc = Utc.timestamp_millis_opt(epoch_millis).single()?;
    let local = utc.with_timezone(&New_York);
    // 11:34 AM EDT / Tue November 14, 2023
    let time_of_day = local.format("%I:%M %p %Z").to_string();
    let day = local.format("%a %B %-d, %Y").to_string();
    Some((time_of_day, day))
}

/// Normalise a Quartz style expression for the cron parser, which has no
/// notion of the `?` "no specific value" marker.
pub fn normalize_cron(expression: &str) -> String {
    expression
        .split_whitespace()
        .map(|field| if field == "?" { "*" } else { field })
        .collect::<Vec<_>>()
        .join(" ")
}

// Arrow snapshot of trade records
pub mod arrow_utils {
    use crate::errors::{Result, StockWatchError};
    use crate::models::TradeRecord;
    use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::reader::FileReader;
    use arrow::ipc::writer::FileWriter;
    use arrow::record_batch::RecordBatch;
    use arrow_array::{Array, Float64Array, Int64Array, StringArray};
    use log::info;
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;

    const TEXT_COLUMNS: [&str; 5] = [
        "symbol",
        "companyName",
        "sector",
        "timeOfUpdate",
        "dayOfLastUpdate",
    ];
    const DECIMAL_COLUMNS: [&str; 7] = [
        "lastTrade",
        "openPrice",
        "rangeHigh",
        "rangeLow",
        "upDown",
        "week52High",
        "week52Low",
    ];

    pub fn trade_schema() -> Schema {
        let mut fields: Vec<Field> = TEXT_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect();
        fields.extend(
            DECIMAL_COLUMNS
                .iter()
                .map(|name| Field::new(*name, DataType::Float64, false)),
        );
        fields.push(Field::new("volume", DataType::Int64, false));
        fields.push(Field::new("ytdChange", DataType::Float64, false));
        Schema::new(fields)
    }

    pub fn trade_records_to_record_batch(rows: &[(String, TradeRecord)]) -> Result<RecordBatch> {
        let mut text: Vec<StringBuilder> = TEXT_COLUMNS.iter().map(|_| StringBuilder::new()).collect();
        let mut decimals: Vec<Float64Builder> =
            DECIMAL_COLUMNS.iter().map(|_| Float64Builder::new()).collect();
        let mut volume = Int64Builder::new();
        let mut ytd = Float64Builder::new();

        for (symbol, record) in rows {
            text[0].append_value(symbol);
            text[1].append_value(&record.company_name);
            text[2].append_value(&record.sector);
            text[3].append_value(&record.time_of_update);
            text[4].append_value(&record.day_of_last_update);

            let values = [
                record.last_trade,
                record.open_price,
                record.range_high,
                record.range_low,
                record.up_down,
                record.week52_high,
                record.week52_low,
            ];
            for (builder, value) in decimals.iter_mut().zip(values) {
                builder.append_value(value);
            }
            volume.append_value(record.volume);
            ytd.append_value(record.ytd_change);
        }

        let mut columns: Vec<ArrayRef> = Vec::new();
        for builder in text.iter_mut() {
            columns.push(Arc::new(builder.finish()));
        }
        for builder in decimals.iter_mut() {
            columns.push(Arc::new(builder.finish()));
        }
        columns.push(Arc::new(volume.finish()));
        columns.push(Arc::new(ytd.finish()));

        RecordBatch::try_new(Arc::new(trade_schema()), columns)
            .map_err(|e| StockWatchError::ArrowError(e.to_string()))
    }

    pub fn save_trade_records(rows: &[(String, TradeRecord)], path: &Path) -> Result<()> {
        info!("Saving {} trade records to {}", rows.len(), path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let batch = trade_records_to_record_batch(rows)?;
        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, &batch.schema())?;
        writer.write(&batch)?;
        writer.finish()?;

        Ok(())
    }

    pub fn read_trade_records(path: &Path) -> Result<Vec<(String, TradeRecord)>> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None)?;

        let mut result = Vec::new();
        for batch in reader {
            let batch = batch?;

            let text_col = |name: &str| -> Result<StringArray> {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .cloned()
                    .ok_or_else(|| StockWatchError::ArrowError(format!("Missing text column {}", name)))
            };
            let decimal_col = |name: &str| -> Result<Float64Array> {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
                    .cloned()
                    .ok_or_else(|| {
                        StockWatchError::ArrowError(format!("Missing decimal column {}", name))
                    })
            };

            let symbol = text_col("symbol")?;
            let company = text_col("companyName")?;
            let sector = text_col("sector")?;
            let time_of_update = text_col("timeOfUpdate")?;
            let day = text_col("dayOfLastUpdate")?;
            let last_trade = decimal_col("lastTrade")?;
            let open = decimal_col("openPrice")?;
            let high = decimal_col("rangeHigh")?;
            let low = decimal_col("rangeLow")?;
            let up_down = decimal_col("upDown")?;
            let week52_high = decimal_col("week52High")?;
            let week52_low = decimal_col("week52Low")?;
            let ytd = decimal_col("ytdChange")?;
            let volume = batch
                .column_by_name("volume")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .cloned()
                .ok_or_else(|| StockWatchError::ArrowError("Missing volume column".to_string()))?;

            for i in 0..batch.num_rows() {
                if symbol.is_null(i) {
                    continue;
                }
                result.push((
                    symbol.value(i).to_string(),
                    TradeRecord {
                        company_name: company.value(i).to_string(),
                        sector: sector.value(i).to_string(),
                        last_trade: last_trade.value(i),
                        time_of_update: time_of_update.value(i).to_string(),
                        day_of_last_update: day.value(i).to_string(),
                        open_price: open.value(i),
                        range_high: high.value(i),
                        range_low: low.value(i),
                        volume: volume.value(i),
                        up_down: up_down.value(i),
                        week52_high: week52_high.value(i),
                        week52_low: week52_low.value(i),
                        ytd_change: ytd.value(i),
                    },
                ));
            }
        }

        Ok(result)
    }
}
