use std::io::{self, Write};

use crate::histogram::Histogram;

impl Histogram {
    /// This function writes the percentile distribution table in the
    /// canonical HDR column format, so output stays diffable across
    /// implementations.
    ///
    /// `ticks_per_half_distance` controls the tick resolution of the
    /// percentile sweep; `value_scale` divides every reported value, e.g.
    /// 1000.0 to report milliseconds from microsecond samples.
    pub fn write_percentile_distribution<W: Write>(
        &self,
        writer: &mut W,
        ticks_per_half_distance: u32,
        value_scale: f64,
    ) -> io::Result<()> {
        let digits = self.layout.significant_digits() as usize;
        writeln!(
            writer,
            "{:>12} {:>14} {:>10} {:>14}\n",
            "Value", "Percentile", "TotalCount", "1/(1-Percentile)"
        )?;
        for record in self.iter_percentiles(ticks_per_half_distance) {
            let value = record.value_iterated_to() as f64 / value_scale;
            let level = record.percentile_level_iterated_to();
            let fraction = level / 100.0;
            if level != 100.0 {
                writeln!(
                    writer,
                    "{:>12.digits$} {:>2.12} {:>10} {:>14.2}",
                    value,
                    fraction,
                    record.total_count_to_this_value(),
                    1.0 / (1.0 - fraction),
                )?;
            } else {
                // The last line leaves the unbounded column off.
                writeln!(
                    writer,
                    "{:>12.digits$} {:>2.12} {:>10}",
                    value,
                    fraction,
                    record.total_count_to_this_value(),
                )?;
            }
        }
        writeln!(
            writer,
            "#[Mean    = {:>12.digits$}, StdDeviation   = {:>12.digits$}]",
            self.mean() / value_scale,
            self.stddev() / value_scale,
        )?;
        writeln!(
            writer,
            "#[Max     = {:>12.digits$}, Total count    = {:>12}]",
            self.max() as f64 / value_scale,
            self.total_count(),
        )?;
        writeln!(
            writer,
            "#[Buckets = {:>12}, SubBuckets     = {:>12}]",
            self.layout.bucket_count(),
            self.layout.sub_bucket_count(),
        )?;
        Ok(())
    }
}
