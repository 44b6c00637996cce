use serde::Serialize;

use crate::cli::OutputFormat;

/// Print a serialisable response in the requested format.
pub fn print<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Raw => serde_json::to_string(value)?,
    };
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::print;
    use crate::cli::OutputFormat;

    #[derive(Serialize)]
    struct Example {
        id: &'static str,
        value: u32,
    }

    #[test]
    fn json_and_raw_both_round_trip() {
        let value = Example { id: "x", value: 7 };
        print(&value, OutputFormat::Json).unwrap();
        print(&value, OutputFormat::Raw).unwrap();
    }
}
