use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessPayment {
    pub order_id: String,
    pub amount: f64,
}

impl ProcessPayment {
    pub async fn handler(args: Self) -> Result<(), String> {
        println!("Processing payment for order {}: ${}", args.order_id, args.amount);

        if args.amount > 1000.0 {
            return Err("Payment requires manual review".to_string());
        }

        Ok(())
    }
}
