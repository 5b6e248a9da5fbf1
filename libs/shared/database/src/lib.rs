pub mod supabase;

pub use supabase::{parse_rows, SupabaseClient};
