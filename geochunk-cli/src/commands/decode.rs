use anyhow::{Context, Result};
use geochunk::ChunkKey;

use super::key::ChunkDescription;
use super::PyramidArgs;

pub fn run(args: &PyramidArgs, key: i64, json: bool) -> Result<()> {
    let layout = args.pyramid_layout()?;
    let chunk = ChunkKey::from_key(&layout, key)
        .with_context(|| format!("{} is not a valid layout v{} key", key, layout.version()))?;
    ChunkDescription::new(&chunk)?.print(json)
}
