use super::*;

impl PermissionService {
    /// Decides a batch of checks, preserving input order 1:1.
    ///
    /// Cache hits and misses are partitioned in one pass; each miss is
    /// resolved individually against the store and cached as it
    /// resolves. No answer differs from what `check` would return for
    /// the same element.
    pub async fn check_permissions_batch(
        &self,
        checks: &[PermissionCheck],
    ) -> AppResult<Vec<PermissionResult>> {
        let mut slots: Vec<Option<PermissionResult>> = Vec::with_capacity(checks.len());
        let mut misses: Vec<usize> = Vec::new();

        for (index, check) in checks.iter().enumerate() {
            let key = auth_cache::permission_check_key(check.scope(), &check.user_id, &check.code);
            match self.cached_decision(&key).await {
                Some(result) => slots.push(Some(result)),
                None => {
                    slots.push(None);
                    misses.push(index);
                }
            }
        }

        for index in misses {
            let result = self.resolve_and_cache(&checks[index]).await?;
            slots[index] = Some(result);
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Returns whether the user holds at least one of the codes.
    ///
    /// Short-circuits on the first grant; every underlying check still
    /// goes through the single-permission cache path.
    pub async fn has_any_permission(
        &self,
        user_id: &UserId,
        permission_codes: &[&str],
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        for code in permission_codes {
            if self
                .check_permission(user_id, code, tenant_id)
                .await?
                .granted
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Returns whether the user holds every one of the codes.
    ///
    /// Short-circuits on the first denial.
    pub async fn has_all_permissions(
        &self,
        user_id: &UserId,
        permission_codes: &[&str],
        tenant_id: Option<TenantId>,
    ) -> AppResult<bool> {
        for code in permission_codes {
            if !self
                .check_permission(user_id, code, tenant_id)
                .await?
                .granted
            {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
