use actix_web::{get, web, HttpResponse, Responder};
use escrow_engine::PriceTable;
use log::*;

// ----------------------------------------------   Health  ----------------------------------------------------
/// Reports healthy once the price table holds prices. Until then, orders cannot be priced.
#[get("/health")]
pub async fn health(prices: web::Data<PriceTable>) -> impl Responder {
    trace!("💻️ Received health check request");
    if prices.is_loaded() {
        HttpResponse::Ok().body("👍️\n")
    } else {
        HttpResponse::ServiceUnavailable().body("Prices are not loaded yet\n")
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use actix_web::{http::StatusCode, test, App};
    use esc_common::Currency;

    use super::*;

    #[actix_web::test]
    async fn health_waits_for_prices() {
        let prices = PriceTable::new();
        let app =
            test::init_service(App::new().app_data(web::Data::new(prices.clone())).service(health)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        prices.replace(HashMap::from([(Currency::USD, 150.0)]));
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(body, "👍️\n");
    }
}
