use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct RenderMetrics {
    // Column reads
    pub total_columns_read: AtomicUsize,
    pub total_read_time_us: AtomicU64,
    pub total_blocks_decoded: AtomicUsize,
    pub total_blocks_skipped: AtomicUsize,

    // Rendering
    pub total_tiles_rendered: AtomicUsize,
    pub total_render_time_us: AtomicU64,
    pub max_render_time_us: AtomicU64,
    pub total_resolve_us: AtomicU64,
    pub total_composite_us: AtomicU64,
    pub total_tiles_failed: AtomicUsize,

    // Pyramid
    pub total_pyramid_tiles: AtomicUsize,
    pub total_pyramid_time_us: AtomicU64,

    // Cache
    pub total_cache_hits: AtomicUsize,
    pub total_cache_misses: AtomicUsize,
    pub total_cache_writes: AtomicUsize,
    pub total_bytes_written: AtomicUsize,

    // Session
    pub start_time: Option<Instant>,
    pub config_summary: String,
}

fn ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

fn avg(total_ms: f64, count: usize) -> f64 {
    if count > 0 { total_ms / count as f64 } else { 0.0 }
}

impl RenderMetrics {
    pub fn new(config_summary: String) -> Self {
        Self {
            start_time: Some(Instant::now()),
            config_summary,
            ..Default::default()
        }
    }

    pub fn record_column_read(&self, duration: Duration, decoded: usize, skipped: usize) {
        self.total_columns_read.fetch_add(1, Ordering::Relaxed);
        self.total_read_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.total_blocks_decoded.fetch_add(decoded, Ordering::Relaxed);
        self.total_blocks_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_render(&self, duration: Duration) {
        self.total_tiles_rendered.fetch_add(1, Ordering::Relaxed);
        let us = duration.as_micros() as u64;
        self.total_render_time_us.fetch_add(us, Ordering::Relaxed);
        self.max_render_time_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn record_resolve(&self, duration: Duration) {
        self.total_resolve_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_composite(&self, duration: Duration) {
        self.total_composite_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_render_failure(&self) {
        self.total_tiles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pyramid_tile(&self, duration: Duration) {
        self.total_pyramid_tiles.fetch_add(1, Ordering::Relaxed);
        self.total_pyramid_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.total_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.total_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_write(&self, bytes: usize) {
        self.total_cache_writes.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn generate_report(&self) -> String {
        let uptime = self.start_time.unwrap_or_else(Instant::now).elapsed();

        let columns = self.total_columns_read.load(Ordering::Relaxed);
        let read_time = ms(self.total_read_time_us.load(Ordering::Relaxed));
        let decoded = self.total_blocks_decoded.load(Ordering::Relaxed);
        let skipped = self.total_blocks_skipped.load(Ordering::Relaxed);

        let rendered = self.total_tiles_rendered.load(Ordering::Relaxed);
        let render_time = ms(self.total_render_time_us.load(Ordering::Relaxed));
        let render_max = ms(self.max_render_time_us.load(Ordering::Relaxed));
        let resolve_time = ms(self.total_resolve_us.load(Ordering::Relaxed));
        let composite_time = ms(self.total_composite_us.load(Ordering::Relaxed));
        let failed = self.total_tiles_failed.load(Ordering::Relaxed);

        let pyramid = self.total_pyramid_tiles.load(Ordering::Relaxed);
        let pyramid_time = ms(self.total_pyramid_time_us.load(Ordering::Relaxed));

        let hits = self.total_cache_hits.load(Ordering::Relaxed);
        let misses = self.total_cache_misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests > 0 { (hits as f64 / total_requests as f64) * 100.0 } else { 0.0 };
        let writes = self.total_cache_writes.load(Ordering::Relaxed);
        let written_mb = self.total_bytes_written.load(Ordering::Relaxed) as f64 / 1024.0 / 1024.0;

        format!(
            "Voxmap Render Report\n\
             ====================\n\
             Configuration: {}\n\
             Session Duration: {:.2?}\n\n\
             [World Read]\n\
             Columns Read: {}\n\
             Avg Time: {:.2} ms/column\n\
             Blocks Decoded: {}\n\
             Blocks Skipped: {}\n\n\
             [Base Tiles]\n\
             Rendered: {}\n\
             Failed: {}\n\
             Avg Time: {:.2} ms/tile\n\
             Max Time: {:.2} ms\n\
               - Surface Resolve: {:.2} ms/tile\n\
               - Composite: {:.2} ms/tile\n\n\
             [Pyramid]\n\
             Tiles Built: {}\n\
             Avg Time: {:.2} ms/tile\n\n\
             [Cache]\n\
             Hits: {}\n\
             Misses: {}\n\
             Hit Rate: {:.1}%\n\
             Writes: {} ({:.2} MB)\n",
            self.config_summary,
            uptime,
            columns, avg(read_time, columns), decoded, skipped,
            rendered, failed, avg(render_time, rendered), render_max,
            avg(resolve_time, rendered), avg(composite_time, rendered),
            pyramid, avg(pyramid_time, pyramid),
            hits, misses, hit_rate, writes, written_mb
        )
    }
}
