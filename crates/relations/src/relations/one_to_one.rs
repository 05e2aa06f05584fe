//! One-to-one base shared by `HasOne`, `BelongsTo` and `MorphOne`

use super::binding::{check_bindings, write_bindings};
use super::keyed::KeyedRelation;
use super::traits::LoadOptions;
use crate::backends::QueryExecutor;
use crate::error::RelationResult;
use crate::model::{Record, RelationValue};

impl KeyedRelation {
    /// First matching record, or `Empty`
    pub(crate) async fn get_one(
        &self,
        conn: &dyn QueryExecutor,
        owner: &Record,
        options: &LoadOptions,
    ) -> RelationResult<RelationValue> {
        let related = self.fetch_for(conn, owner, options).await?;
        Ok(RelationValue::from_option(related.into_iter().next()))
    }

    /// Batch resolution storing a single record (or `Empty`) per owner.
    /// Bound attributes are written onto the owner instead of the cache.
    pub(crate) async fn eager_load_one(
        &self,
        conn: &dyn QueryExecutor,
        owners: &mut [Record],
        options: &LoadOptions,
    ) -> RelationResult<()> {
        let index = self.fetch_batch(conn, owners, options).await?;
        let bindings = &self.descriptor.bindings;

        // every owner is checked before any is written
        if !bindings.is_empty() {
            for owner in owners.iter() {
                check_bindings(owner, bindings)?;
            }
        }

        for owner in owners.iter_mut() {
            let related = self.matches_for(&index, owner).into_iter().next();
            if bindings.is_empty() {
                owner.set_relation(self.name(), RelationValue::from_option(related));
            } else {
                write_bindings(owner, bindings, related.as_ref());
            }
        }
        Ok(())
    }
}
