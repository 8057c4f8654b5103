//! CSV frame files: `timestamp_ms,value[,red,ir]` with a header row.

use crate::signal::Frame;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::{Read, Write};
use std::path::Path;

pub fn read_frames_csv(path: &Path) -> Result<Vec<Frame>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_frames(file).with_context(|| format!("parsing {}", path.display()))
}

/// Empty `value` cells become NaN so the conditioner can substitute them;
/// red/IR are kept only when both cells parse.
pub fn read_frames<R: Read>(reader: R) -> Result<Vec<Frame>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers().context("reading header")?.clone();
    let ts_idx = locate_column(&headers, "timestamp_ms")?;
    let value_idx = locate_column(&headers, "value")?;
    let red_idx = locate_column(&headers, "red").ok();
    let ir_idx = locate_column(&headers, "ir").ok();

    let mut frames = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.context("reading record")?;
        let line = row + 2;
        let timestamp_ms = record
            .get(ts_idx)
            .ok_or_else(|| anyhow::anyhow!("line {line}: missing timestamp"))?
            .parse::<i64>()
            .with_context(|| format!("line {line}: parsing timestamp"))?;
        let value = match record.get(value_idx).unwrap_or("") {
            "" => f64::NAN,
            text => text
                .parse::<f64>()
                .with_context(|| format!("line {line}: parsing value"))?,
        };
        let channel = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .and_then(|v| v.parse::<f64>().ok())
        };
        let mut frame = Frame::new(value, timestamp_ms);
        if let (Some(red), Some(ir)) = (channel(red_idx), channel(ir_idx)) {
            frame = frame.with_channels(red, ir);
        }
        frames.push(frame);
    }
    Ok(frames)
}

/// Red/IR columns are written only when at least one frame carries them.
pub fn write_frames<W: Write>(writer: W, frames: &[Frame]) -> Result<()> {
    let with_channels = frames.iter().any(|f| f.red.is_some() && f.ir.is_some());
    let mut writer = WriterBuilder::new().from_writer(writer);
    if with_channels {
        writer.write_record(["timestamp_ms", "value", "red", "ir"])?;
    } else {
        writer.write_record(["timestamp_ms", "value"])?;
    }
    for frame in frames {
        let mut row = vec![frame.timestamp_ms.to_string(), format!("{:.6}", frame.value)];
        if with_channels {
            let cell = |v: Option<f64>| v.map(|x| format!("{x:.6}")).unwrap_or_default();
            row.push(cell(frame.red));
            row.push(cell(frame.ir));
        }
        writer.write_record(&row)?;
    }
    writer.flush().context("flushing frames")?;
    Ok(())
}

fn locate_column(headers: &StringRecord, requested: &str) -> Result<usize> {
    headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case(requested))
        .ok_or_else(|| anyhow::anyhow!("missing {requested} column"))
}
