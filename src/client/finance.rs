//! Account and budget client methods

use crate::{
    Account, AccountRequest, Budget, BudgetRequest, SuccessResponse,
    client::{ApiClient, ApiRequest, ClientError},
    endpoints::{self, format_endpoint},
};

impl ApiClient {
    /// List the accounts of the logged in user.
    pub async fn accounts(&self) -> Result<Vec<Account>, ClientError> {
        self.get_json(endpoints::ACCOUNTS).await
    }

    /// Create an account.
    pub async fn create_account(&self, request: &AccountRequest) -> Result<Account, ClientError> {
        self.post_json(endpoints::ACCOUNTS, request).await
    }

    /// Rename or retype an account.
    pub async fn update_account(
        &self,
        account_id: i64,
        request: &AccountRequest,
    ) -> Result<(), ClientError> {
        let path = format_endpoint(endpoints::ACCOUNT, account_id);
        let _: SuccessResponse = self.put_json(&path, request).await?;
        Ok(())
    }

    /// Delete an account.
    pub async fn delete_account(&self, account_id: i64) -> Result<(), ClientError> {
        self.delete(&format_endpoint(endpoints::ACCOUNT, account_id))
            .await?;
        Ok(())
    }

    /// List budgets, optionally only for `month` (`YYYY-MM`).
    pub async fn budgets(&self, month: Option<&str>) -> Result<Vec<Budget>, ClientError> {
        let mut request = ApiRequest::get(endpoints::BUDGETS);
        if let Some(month) = month {
            request = request.query("month", month);
        }

        self.send(request).await?.json()
    }

    /// Create or replace a budget.
    pub async fn set_budget(&self, request: &BudgetRequest) -> Result<(), ClientError> {
        let _: SuccessResponse = self.post_json(endpoints::BUDGETS, request).await?;
        Ok(())
    }

    /// Delete a budget.
    pub async fn delete_budget(&self, budget_id: i64) -> Result<(), ClientError> {
        self.delete(&format_endpoint(endpoints::BUDGET, budget_id))
            .await?;
        Ok(())
    }
}
