pub mod ledger;
pub mod validator;
