use tracing::instrument;

use hrgate_audit::{AuditQuery, AuditRecord, Page, PageRequest};

use super::PermissionAdmin;
use crate::{AdminError, RequestContext};

impl PermissionAdmin {
    /// Audit records visible to the caller, newest first.
    ///
    /// Pages are 1-based; the page size is clamped to the configured maximum.
    /// Tenant callers only see their own tenant's records.
    #[instrument(skip_all, fields(scope = %ctx.scope(), page = page, page_size = page_size))]
    pub async fn get_audit_logs(
        &self,
        ctx: &RequestContext,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<AuditRecord>, AdminError> {
        let query = AuditQuery::for_scope(&ctx.scope())
            .entity_type(entity_type.map(str::to_string))
            .entity_id(entity_id.map(str::to_string));
        let request = PageRequest::new(page, page_size).capped(self.settings.audit_max_page_size);
        Ok(self.audit.query(&query, request).await?)
    }
}
