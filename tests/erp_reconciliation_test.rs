#[cfg(test)]
mod erp_reconciliation_integration_tests {
    use bigdecimal::BigDecimal;
    use deskserver::financial::erp::{
        reconcile_payment, reconcile_ticket, ErpPaymentEvent, ErpTicketEvent,
    };
    use deskserver::financial::FinancialTicket;
    use deskserver::shared::schema::{financial_tickets, users};
    use deskserver::shared::utils::{create_conn, run_migrations, DbPool};
    use diesel::prelude::*;
    use serde_json::json;
    use uuid::Uuid;

    /// The reconciliation tests need a real Postgres. They run against
    /// DATABASE_URL and skip silently when it is not reachable.
    fn test_pool() -> Option<DbPool> {
        let url = match std::env::var("DATABASE_URL") {
            Ok(u) => u,
            Err(_) => {
                println!("Skipping test - DATABASE_URL not set");
                return None;
            }
        };
        let pool = match create_conn(&url, 2) {
            Ok(p) => p,
            Err(_) => {
                println!("Skipping test - cannot connect to database");
                return None;
            }
        };
        if run_migrations(&pool).is_err() {
            println!("Skipping test - migrations failed");
            return None;
        }
        Some(pool)
    }

    fn ticket_event(erp_id: &str, email: &str, name: &str, amount: &str) -> ErpTicketEvent {
        serde_json::from_value(json!({
            "erpId": erp_id,
            "erpType": "contaazul",
            "title": "Mensalidade",
            "amount": amount,
            "dueDate": "2026-09-30",
            "clientEmail": email,
            "clientName": name,
        }))
        .unwrap()
    }

    fn payment_event(pay_id: &str, erp_ticket_id: &str) -> ErpPaymentEvent {
        serde_json::from_value(json!({
            "erpId": pay_id,
            "erpTicketId": erp_ticket_id,
            "erpType": "contaazul",
            "paymentDate": "2026-08-23T12:00:00Z",
            "amount": "75.00",
            "paymentMethod": "pix",
            "metadata": {"gateway": "asaas"}
        }))
        .unwrap()
    }

    #[test]
    fn ticket_event_creates_then_corrects_in_place() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();
        let erp_id = format!("INV-{}", Uuid::new_v4());
        let email = format!("{}@example.com", Uuid::new_v4());

        let first = reconcile_ticket(
            &mut conn,
            ticket_event(&erp_id, &email, "Cliente Teste - Empresa Teste", "100.00"),
        )
        .unwrap();
        assert!(first.success);
        let local_id = first.ticket_id.unwrap();
        assert!(local_id.starts_with("FT-"), "unexpected id {local_id}");

        // A manual status override must survive the correction below.
        diesel::update(financial_tickets::table.find(&local_id))
            .set(financial_tickets::status.eq("paid"))
            .execute(&mut conn)
            .unwrap();

        let second = reconcile_ticket(
            &mut conn,
            ticket_event(&erp_id, &email, "Cliente Teste - Empresa Teste", "150.00"),
        )
        .unwrap();
        assert!(second.success);
        assert_eq!(second.ticket_id.as_deref(), Some(local_id.as_str()));

        let (amount, status): (BigDecimal, String) = financial_tickets::table
            .find(&local_id)
            .select((financial_tickets::amount, financial_tickets::status))
            .first(&mut conn)
            .unwrap();
        assert_eq!(amount, "150.00".parse::<BigDecimal>().unwrap());
        assert_eq!(status, "paid");
    }

    #[test]
    fn unknown_client_is_provisioned_once() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();
        let email = format!("{}@example.com", Uuid::new_v4());

        reconcile_ticket(
            &mut conn,
            ticket_event(
                &format!("INV-{}", Uuid::new_v4()),
                &email,
                "Fulano de Tal - Acme Ltda",
                "10.00",
            ),
        )
        .unwrap();

        let clients: Vec<(String, Option<String>, String)> = users::table
            .filter(users::email.eq(&email))
            .select((users::name, users::company, users::role))
            .load(&mut conn)
            .unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].0, "Fulano de Tal");
        assert_eq!(clients[0].1.as_deref(), Some("Acme Ltda"));
        assert_eq!(clients[0].2, "user");

        // Same address in a different case matches the existing account.
        reconcile_ticket(
            &mut conn,
            ticket_event(
                &format!("INV-{}", Uuid::new_v4()),
                &email.to_uppercase(),
                "Fulano de Tal",
                "20.00",
            ),
        )
        .unwrap();

        let count: i64 = users::table
            .filter(users::email.ilike(&email))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn payment_with_no_match_is_rejected_and_creates_nothing() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();

        let before: i64 = financial_tickets::table
            .count()
            .get_result(&mut conn)
            .unwrap();

        let outcome = reconcile_payment(
            &mut conn,
            payment_event(
                &format!("PAY-{}", Uuid::new_v4()),
                &format!("INV-{}", Uuid::new_v4()),
            ),
        )
        .unwrap();
        assert!(!outcome.success);
        assert!(outcome.ticket_id.is_none());

        let after: i64 = financial_tickets::table
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn payment_settles_the_invoice_it_names() {
        let Some(pool) = test_pool() else { return };
        let mut conn = pool.get().unwrap();
        let erp_id = format!("INV-{}", Uuid::new_v4());
        let email = format!("{}@example.com", Uuid::new_v4());

        let created = reconcile_ticket(
            &mut conn,
            ticket_event(&erp_id, &email, "Cliente Teste", "75.00"),
        )
        .unwrap();
        let local_id = created.ticket_id.unwrap();

        let pay_id = format!("PAY-{}", Uuid::new_v4());
        let outcome = reconcile_payment(&mut conn, payment_event(&pay_id, &erp_id)).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.ticket_id.as_deref(), Some(local_id.as_str()));

        let ticket: FinancialTicket = financial_tickets::table
            .find(&local_id)
            .first(&mut conn)
            .unwrap();
        assert_eq!(ticket.status, "paid");
        assert!(ticket.payment_date.is_some());
        assert_eq!(ticket.payment_method.as_deref(), Some("pix"));
        let notes = ticket.notes.clone().unwrap_or_default();
        assert!(notes.contains(&pay_id), "note should cite the payment event");
        assert_eq!(ticket.metadata["payment"]["gateway"], "asaas");

        // A replayed confirmation appends instead of overwriting.
        let replay_id = format!("PAY-{}", Uuid::new_v4());
        reconcile_payment(&mut conn, payment_event(&replay_id, &erp_id)).unwrap();
        let notes: Option<String> = financial_tickets::table
            .find(&local_id)
            .select(financial_tickets::notes)
            .first(&mut conn)
            .unwrap();
        let notes = notes.unwrap_or_default();
        assert!(notes.contains(&pay_id));
        assert!(notes.contains(&replay_id));
        assert_eq!(notes.lines().count(), 2);
    }
}
