//! Patient-facing messages (Brazilian Portuguese).

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

use appointment_cell::{AppointmentDetails, PatientAppointments};
use intent_cell::DayPeriod;
use patient_cell::ContactField;
use shared_models::{AppointmentStatus, CareType, Location, Patient, Slot, Specialty};

pub const MENU: &str = "Como posso ajudar?\n1. Agendar consulta\n2. Ver minhas consultas\n3. Cancelar consulta";

pub fn welcome(clinic_name: &str) -> String {
    format!(
        "Olá! Bem-vindo(a) à {}. Para começar, informe o seu CPF (somente números ou no formato 000.000.000-00).",
        clinic_name
    )
}

pub fn ask_national_id() -> String {
    "Por favor, informe o seu CPF para continuarmos.".to_string()
}

pub fn invalid_national_id() -> String {
    "CPF inválido. Confira os 11 dígitos e envie novamente.".to_string()
}

pub fn greet_patient(name: &str) -> String {
    let first = name.split_whitespace().next().unwrap_or(name);
    format!("Olá, {}! {}", first, MENU)
}

pub fn not_registered(formatted_cpf: &str) -> String {
    format!(
        "Não encontrei cadastro para o CPF {}. Vamos fazer o seu cadastro. Qual é o seu nome completo?",
        formatted_cpf
    )
}

pub fn no_registration_for_lookup(formatted_cpf: &str) -> String {
    format!(
        "Não há cadastro para o CPF {}, então não existem consultas para mostrar. Envie \"oi\" para começar de novo.",
        formatted_cpf
    )
}

pub fn ask_name() -> String {
    "Qual é o seu nome completo?".to_string()
}

pub fn ask_phone() -> String {
    "Informe um telefone para contato com DDD, por exemplo (31) 99999-8888.".to_string()
}

pub fn ask_email() -> String {
    "Qual é o seu e-mail? Se preferir não informar, responda \"pular\".".to_string()
}

pub fn ask_health_plan() -> String {
    "Você tem plano de saúde? Envie o número da carteirinha ou responda \"particular\".".to_string()
}

pub fn invalid_field(field: ContactField) -> String {
    let reason = match field {
        ContactField::NationalId => "o CPF não é válido",
        ContactField::Name => "o nome deve ter entre 3 e 120 letras, sem números",
        ContactField::Phone => "o telefone deve ter DDD e 8 ou 9 dígitos",
        ContactField::Email => "o e-mail não parece válido",
        ContactField::HealthPlanCard => "a carteirinha do plano deve ter de 6 a 50 letras ou números",
    };
    format!("Não consegui aceitar essa informação: {}.", reason)
}

pub fn registered(patient: &Patient) -> String {
    let first = patient.name.split_whitespace().next().unwrap_or(&patient.name);
    match (patient.care_type, patient.health_plan_card.as_deref()) {
        (CareType::HealthPlan, Some(card)) => {
            format!("Cadastro concluído, {}! Atendimento pelo plano de saúde (carteirinha {}).", first, card)
        }
        _ => format!("Cadastro concluído, {}! Atendimento particular.", first),
    }
}

pub fn choose_specialty(specialties: &[Specialty]) -> String {
    let mut text = "Qual especialidade você procura?".to_string();
    for (i, specialty) in specialties.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, specialty.name));
    }
    text
}

pub fn specialty_not_understood(specialties: &[Specialty]) -> String {
    format!("Não identifiquei a especialidade. {}", choose_specialty(specialties))
}

pub fn no_specialties() -> String {
    "No momento não há especialidades disponíveis para agendamento.".to_string()
}

pub fn no_slots(specialty: &str) -> String {
    format!(
        "Não há horários disponíveis para {} nos próximos dias. Deseja escolher outra especialidade?",
        specialty
    )
}

pub fn date_unavailable(date: NaiveDate) -> String {
    format!("Não há horários livres em {}. Estas são as próximas opções:", date_label(date))
}

pub fn location_not_found(reference: &str) -> String {
    format!("Não identifiquei uma única unidade para \"{}\"; mostrando todas.", reference)
}

pub fn date_in_past() -> String {
    "A data informada já passou. Estes são os próximos horários disponíveis:".to_string()
}

pub fn doctor_not_found(reference: &str) -> String {
    format!("Não encontrei o(a) médico(a) \"{}\" nessa especialidade; mostrando todos.", reference)
}

pub fn ask_time_for_period(period: DayPeriod) -> String {
    format!("Você tem algum horário de preferência {}? Por exemplo, \"às 10h\".", period_label(period))
}

pub fn slot_list(slots: &[Slot]) -> String {
    let mut text = "Escolha um horário:".to_string();
    for (i, slot) in slots.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, slot_label(slot)));
    }
    text
}

pub fn invalid_option(count: usize) -> String {
    format!("Opção inválida. Responda com um número de 1 a {}.", count)
}

pub fn confirm_booking(slot: &Slot, specialty: &str, referral: Option<bool>) -> String {
    let mut text = format!(
        "Confirma a consulta de {} com {} em {}{}? (sim/não)",
        specialty,
        slot.doctor_name,
        when_label(slot.date, slot.start_time),
        place_suffix(slot)
    );
    match referral {
        Some(true) => text.push_str("\nRecebemos o seu encaminhamento médico."),
        Some(false) => text.push_str(
            "\nEssa especialidade exige encaminhamento médico. Envie o documento por aqui ou leve-o no dia da consulta.",
        ),
        None => {}
    }
    text
}

pub fn booked(slot: &Slot, specialty: &str, formatted_cpf: Option<&str>) -> String {
    let mut text = format!(
        "Consulta agendada! {} com {} em {}{}.",
        specialty,
        slot.doctor_name,
        when_label(slot.date, slot.start_time),
        place_suffix(slot)
    );
    if let Some(cpf) = formatted_cpf {
        text.push_str(&format!(" Paciente: CPF {}.", cpf));
    }
    text.push_str(" Chegue com 15 minutos de antecedência.");
    text
}

pub fn slot_taken() -> String {
    "Esse horário acabou de ser ocupado. Escolha outro:".to_string()
}

pub fn booking_declined() -> String {
    "Tudo bem, nada foi agendado. Escolha outro horário:".to_string()
}

pub fn no_scheduled_appointments() -> String {
    "Você não possui consultas agendadas.".to_string()
}

pub fn appointment_overview(listing: &PatientAppointments) -> String {
    if listing.is_empty() {
        return "Você ainda não possui consultas.".to_string();
    }

    let mut text = String::new();
    if listing.scheduled.is_empty() {
        text.push_str(&no_scheduled_appointments());
    } else {
        text.push_str("Consultas agendadas:");
        for (i, details) in listing.scheduled.iter().enumerate() {
            text.push_str(&format!("\n{}. {}", i + 1, appointment_label(details)));
        }
    }
    if !listing.recent_completed.is_empty() {
        text.push_str("\nÚltimas consultas realizadas:");
        for details in &listing.recent_completed {
            text.push_str(&format!("\n- {}", appointment_label(details)));
        }
    }
    if !listing.recent_cancelled.is_empty() {
        text.push_str("\nÚltimos cancelamentos:");
        for details in &listing.recent_cancelled {
            text.push_str(&format!("\n- {}", appointment_label(details)));
        }
    }
    text
}

pub fn choose_cancel_target(appointments: &[AppointmentDetails]) -> String {
    let mut text = "Qual consulta você deseja cancelar?".to_string();
    for (i, details) in appointments.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, appointment_label(details)));
    }
    text
}

pub fn confirm_cancel(details: &AppointmentDetails) -> String {
    format!("Confirma o cancelamento de {}? (sim/não)", appointment_label(details))
}

pub fn cancelled(details: &AppointmentDetails) -> String {
    format!("Consulta cancelada: {}.", appointment_label(details))
}

pub fn cancel_declined() -> String {
    "Certo, nenhuma consulta foi cancelada.".to_string()
}

pub fn cancel_not_found() -> String {
    "Essa consulta não está mais agendada.".to_string()
}

pub fn cancel_forbidden() -> String {
    "Essa consulta não pertence ao seu cadastro.".to_string()
}

pub fn clinic_info(clinic_name: &str, clinic_phone: &str, locations: &[Location]) -> String {
    let mut text = format!(
        "{}: atendimento de segunda a sexta, das 08:00 às 18:00. Telefone: {}.",
        clinic_name, clinic_phone
    );
    if !locations.is_empty() {
        text.push_str("\nUnidades:");
        for location in locations {
            text.push_str(&format!("\n- {}", location.name));
            if let Some(address) = &location.address {
                text.push_str(&format!(", {}", address));
            }
            if let Some(city) = &location.city {
                text.push_str(&format!(" ({})", city));
            }
        }
    }
    text
}

pub fn not_understood() -> String {
    "Desculpe, não entendi. Pode reformular?".to_string()
}

pub fn storage_failure() -> String {
    "Estamos com instabilidade na conexão. Por favor, tente novamente em instantes.".to_string()
}

pub fn attachment_received() -> String {
    "Documento recebido, obrigado!".to_string()
}

pub fn weekday_label(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "segunda-feira",
        Weekday::Tue => "terça-feira",
        Weekday::Wed => "quarta-feira",
        Weekday::Thu => "quinta-feira",
        Weekday::Fri => "sexta-feira",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

pub fn date_label(date: NaiveDate) -> String {
    format!("{}, {}", weekday_label(date.weekday()), date.format("%d/%m/%Y"))
}

pub fn when_label(date: NaiveDate, time: NaiveTime) -> String {
    format!("{} às {}", date_label(date), time.format("%H:%M"))
}

pub fn slot_label(slot: &Slot) -> String {
    format!(
        "{} - {}{}",
        when_label(slot.date, slot.start_time),
        slot.doctor_name,
        place_suffix(slot)
    )
}

fn place_suffix(slot: &Slot) -> String {
    slot.location_name
        .as_deref()
        .map(|name| format!(" ({})", name))
        .unwrap_or_default()
}

pub fn appointment_label(details: &AppointmentDetails) -> String {
    let appointment = &details.appointment;
    let mut label = format!(
        "{} com {} em {}",
        details.specialty_name,
        details.doctor_name,
        when_label(appointment.date, appointment.start_time)
    );
    match appointment.status {
        AppointmentStatus::Scheduled => {}
        AppointmentStatus::Cancelled => label.push_str(" (cancelada)"),
        AppointmentStatus::Completed => label.push_str(" (realizada)"),
    }
    label
}

fn period_label(period: DayPeriod) -> &'static str {
    match period {
        DayPeriod::Morning => "pela manhã",
        DayPeriod::Afternoon => "à tarde",
        DayPeriod::Evening => "à noite",
    }
}
